use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use careplan_core::care_plan::{care_plan_download_for_order, CarePlanGenerator};
use careplan_core::config::core_config_from_env;
use careplan_core::constants::ORDER_LIST_LIMIT;
use careplan_core::database::open_database;
use careplan_core::duplicates::{self, DuplicateResult};
use careplan_core::export::{export_filename, export_orders_csv};
use careplan_core::llm::client_from_settings;
use careplan_core::repositories::{care_plans, orders, patients};
use careplan_core::validation::parse_date;
use chrono::Utc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "careplan")]
#[command(about = "Care plan generator CLI")]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "CAREPLAN_DATABASE_PATH")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the most recent orders
    ListOrders,
    /// Show an order and its care plan
    ShowOrder {
        /// Order id
        id: i64,
    },
    /// Generate, or regenerate, the care plan for an order
    Generate {
        /// Order id
        id: i64,
    },
    /// Write an order's care plan to a text file
    Download {
        /// Order id
        id: i64,
        /// Output directory (default: current directory)
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Export all orders to CSV
    ExportCsv {
        /// Output file (default: orders_export_<timestamp>.csv)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Check a provider name and NPI for duplicates
    CheckProvider {
        name: String,
        npi: String,
    },
    /// Check patient details for duplicates
    CheckPatient {
        first_name: String,
        last_name: String,
        mrn: String,
        /// Date of birth (YYYY-MM-DD)
        #[arg(long)]
        dob: Option<String>,
    },
    /// Check for a recent order of the same medication
    CheckOrder {
        patient_id: i64,
        medication: String,
    },
    /// Delete a patient with all of their orders and care plans
    DeletePatient {
        /// Patient id
        id: i64,
    },
}

fn print_duplicate(result: &DuplicateResult) {
    if result.is_ok() {
        println!("OK: no duplicates found.");
        return;
    }
    let label = if result.is_blocking() { "BLOCK" } else { "WARN" };
    println!("{label}: {}", result.message);
    for item in &result.similar_items {
        let describe = [
            item.name.as_deref(),
            item.npi.as_deref(),
            item.mrn.as_deref(),
            item.dob.as_deref(),
            item.medication.as_deref(),
            item.created_at.as_deref(),
            item.status.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(", ");
        println!("  - #{}: {}", item.id, describe);
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("careplan_core=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = core_config_from_env()?;
    let database = cli
        .database
        .unwrap_or_else(|| cfg.database_path().to_path_buf());

    let Some(command) = cli.command else {
        println!("Use 'careplan --help' for commands");
        return Ok(());
    };

    let conn = open_database(&database)
        .with_context(|| format!("Could not open database {}", database.display()))?;

    match command {
        Commands::ListOrders => {
            let details = orders::list_order_details(&conn, Some(ORDER_LIST_LIMIT))?;
            if details.is_empty() {
                println!("No orders found.");
            }
            for detail in details {
                println!(
                    "#{}  {}  {}  {}  {}  {}",
                    detail.order.id,
                    detail.order.created_at.format("%Y-%m-%d %H:%M"),
                    detail.order.status,
                    detail.patient,
                    detail.order.medication_name,
                    detail.provider.name
                );
            }
        }
        Commands::ShowOrder { id } => {
            let detail = orders::require_order_detail(&conn, id)?;
            let order = &detail.order;
            println!("Order #{} ({})", order.id, order.status);
            println!("Patient: {}", detail.patient);
            println!("Provider: {}", detail.provider);
            println!("Primary Diagnosis: {}", order.primary_diagnosis());
            println!("Medication: {}", order.medication_name);
            match care_plans::get_care_plan_for_order(&conn, id)? {
                Some(plan) => {
                    println!(
                        "\nCare plan ({}, {}{}):\n",
                        plan.model_used,
                        plan.generated_at.format("%Y-%m-%d %H:%M"),
                        if plan.is_edited { ", edited" } else { "" }
                    );
                    println!("{}", plan.content);
                }
                None => println!("\nNo care plan generated yet."),
            }
        }
        Commands::Generate { id } => {
            let client = client_from_settings(cfg.llm())?;
            let generator = CarePlanGenerator::new(client, cfg.few_shot_limit());
            let saved = generator.generate_for_order(&conn, id)?;
            if saved.regenerated {
                println!("Care plan already existed and was regenerated.");
            }
            println!(
                "Care plan generated successfully in {}ms!",
                saved.care_plan.generation_time_ms.unwrap_or_default()
            );
        }
        Commands::Download { id, out_dir } => {
            let download = care_plan_download_for_order(&conn, id)?;
            let path = out_dir.unwrap_or_default().join(&download.filename);
            std::fs::write(&path, download.body)
                .with_context(|| format!("Could not write {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        Commands::ExportCsv { output } => {
            let csv = export_orders_csv(&conn)?;
            let path = output.unwrap_or_else(|| PathBuf::from(export_filename(Utc::now())));
            std::fs::write(&path, csv)
                .with_context(|| format!("Could not write {}", path.display()))?;
            println!("Exported orders to {}", path.display());
        }
        Commands::CheckProvider { name, npi } => {
            if let Some(existing) = duplicates::get_existing_provider_by_npi(&conn, npi.trim())? {
                println!("Provider found: {existing}");
            } else {
                print_duplicate(&duplicates::check_provider_duplicate(&conn, &name, &npi, None)?);
            }
        }
        Commands::CheckPatient {
            first_name,
            last_name,
            mrn,
            dob,
        } => {
            if let Some(existing) = duplicates::get_existing_patient_by_mrn(&conn, mrn.trim())? {
                println!("Patient found: {existing}");
            } else {
                let dob = dob.as_deref().and_then(parse_date);
                print_duplicate(&duplicates::check_patient_duplicate(
                    &conn,
                    &first_name,
                    &last_name,
                    &mrn,
                    dob,
                    None,
                )?);
            }
        }
        Commands::CheckOrder {
            patient_id,
            medication,
        } => {
            print_duplicate(&duplicates::check_order_duplicate(
                &conn,
                patient_id,
                &medication,
                cfg.order_duplicate_window_days(),
                None,
            )?);
        }
        Commands::DeletePatient { id } => {
            let patient = patients::get_patient(&conn, id)?
                .with_context(|| format!("Patient {id} not found"))?;
            let removed = patients::delete_patient(&conn, id)?;
            println!("Deleted {patient} and {removed} order(s).");
        }
    }

    Ok(())
}
