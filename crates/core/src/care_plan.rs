//! Care plan generation, editing and download.
//!
//! Generation is split so that callers holding a shared connection can release it while the
//! model runs:
//!
//! 1. [`CarePlanGenerator::prepare`] loads the order and few-shot examples and builds the prompt.
//! 2. [`CarePlanGenerator::generate`] calls the model. No database access.
//! 3. [`save_generated_care_plan`] stores the result and completes the order.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use utoipa::ToSchema;

use crate::llm::{CompletionRequest, LlmClient};
use crate::models::{CarePlan, CarePlanWithOrder, NewCarePlan, OrderDetail, OrderStatus};
use crate::prompt::build_care_plan_prompt;
use crate::repositories::{care_plans, orders};
use crate::{CarePlanError, CarePlanResult};

/// Recent care plans from other orders, newest first, for use as few-shot examples.
pub fn get_recent_care_plans(
    conn: &Connection,
    limit: usize,
    exclude_order_id: Option<i64>,
) -> CarePlanResult<Vec<CarePlanWithOrder>> {
    care_plans::recent_care_plans(conn, limit, exclude_order_id)
}

/// Everything the model call needs, loaded up front.
#[derive(Clone, Debug)]
pub struct PreparedGeneration {
    pub order: OrderDetail,
    pub prompt: String,
    pub example_count: usize,
}

/// Model output with its timing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedCarePlan {
    pub content: String,
    pub model_used: String,
    pub generation_time_ms: i64,
}

/// A stored care plan and whether it replaced an earlier one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct SavedCarePlan {
    pub care_plan: CarePlan,
    pub regenerated: bool,
}

#[derive(Clone)]
pub struct CarePlanGenerator {
    client: Arc<dyn LlmClient>,
    few_shot_limit: usize,
}

impl CarePlanGenerator {
    pub fn new(client: Arc<dyn LlmClient>, few_shot_limit: usize) -> Self {
        Self {
            client,
            few_shot_limit,
        }
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    /// Load the order and up to `few_shot_limit` recent plans from other orders, and build the
    /// prompt.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the order does not exist.
    pub fn prepare(&self, conn: &Connection, order_id: i64) -> CarePlanResult<PreparedGeneration> {
        let order = orders::require_order_detail(conn, order_id)?;
        let examples = get_recent_care_plans(conn, self.few_shot_limit, Some(order_id))?;

        if examples.is_empty() {
            tracing::info!(order_id, "no previous care plans available for few-shot examples");
        } else {
            tracing::info!(order_id, example_count = examples.len(), "including care plan examples in prompt");
        }

        let prompt = build_care_plan_prompt(&order, &examples);
        Ok(PreparedGeneration {
            order,
            prompt,
            example_count: examples.len(),
        })
    }

    /// Call the model for a prepared order. Blocks for the duration of the call.
    pub fn generate(&self, prepared: &PreparedGeneration) -> CarePlanResult<GeneratedCarePlan> {
        let order_id = prepared.order.order.id;
        let model = self.client.model();
        tracing::info!(
            order_id,
            model,
            prompt_chars = prepared.prompt.chars().count(),
            "starting care plan generation"
        );

        let started = Instant::now();
        let result = self.client.complete(&CompletionRequest {
            prompt: &prepared.prompt,
            order: &prepared.order,
        });
        let elapsed_ms = started.elapsed().as_millis() as i64;

        match result {
            Ok(content) => {
                tracing::info!(order_id, model, elapsed_ms, "generated care plan");
                Ok(GeneratedCarePlan {
                    content,
                    model_used: model.to_string(),
                    generation_time_ms: elapsed_ms,
                })
            }
            Err(e) => {
                tracing::error!(order_id, model, elapsed_ms, error = %e, "care plan generation failed");
                Err(e)
            }
        }
    }

    /// Prepare, generate and save in one call, on the current thread.
    pub fn generate_for_order(&self, conn: &Connection, order_id: i64) -> CarePlanResult<SavedCarePlan> {
        let prepared = self.prepare(conn, order_id)?;
        let generated = self.generate(&prepared)?;
        save_generated_care_plan(conn, order_id, &generated)
    }
}

/// Store a generated plan, replacing any earlier plan, and mark the order completed.
///
/// Runs in one transaction.
pub fn save_generated_care_plan(
    conn: &Connection,
    order_id: i64,
    generated: &GeneratedCarePlan,
) -> CarePlanResult<SavedCarePlan> {
    let tx = conn.unchecked_transaction()?;

    let regenerated = care_plans::delete_care_plan_for_order(&tx, order_id)?;
    let care_plan = care_plans::insert_care_plan(
        &tx,
        order_id,
        &NewCarePlan {
            content: generated.content.clone(),
            model_used: generated.model_used.clone(),
            generation_time_ms: Some(generated.generation_time_ms),
        },
        Utc::now(),
    )?;
    orders::set_order_status(&tx, order_id, OrderStatus::Completed)?;
    tx.commit()?;

    if regenerated {
        tracing::info!(order_id, care_plan_id = care_plan.id, "care plan regenerated");
    }
    Ok(SavedCarePlan {
        care_plan,
        regenerated,
    })
}

/// Replace a care plan's content with a person's edit.
///
/// # Errors
///
/// * `EmptyCarePlanContent` - the content is blank after trimming.
/// * `NotFound` - no care plan has this id.
pub fn edit_care_plan(conn: &Connection, id: i64, content: &str) -> CarePlanResult<CarePlan> {
    let content = content.trim();
    if content.is_empty() {
        return Err(CarePlanError::EmptyCarePlanContent);
    }
    let updated = care_plans::update_care_plan_content(conn, id, content, Utc::now())?;
    tracing::info!(care_plan_id = id, order_id = updated.order_id, "care plan edited");
    Ok(updated)
}

/// Plain-text attachment for a care plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CarePlanDownload {
    pub filename: String,
    pub body: String,
}

pub fn render_care_plan_download(detail: &OrderDetail, plan: &CarePlan) -> CarePlanDownload {
    let rule = "=".repeat(60);
    let patient = &detail.patient;
    let provider = &detail.provider;
    let order = &detail.order;

    let body = format!(
        "CARE PLAN\n\
         {rule}\n\n\
         Patient: {patient_name}\n\
         MRN: {mrn}\n\
         Provider: {provider_name} (NPI: {npi})\n\
         Primary Diagnosis: {code}\n\
         Medication: {medication}\n\
         Generated: {generated}\n\
         \n{rule}\n\n\
         {content}",
        patient_name = patient.full_name(),
        mrn = patient.mrn,
        provider_name = provider.name,
        npi = provider.npi,
        code = order.primary_diagnosis_code,
        medication = order.medication_name,
        generated = plan.generated_at.format("%Y-%m-%d %H:%M"),
        content = plan.content,
    );

    CarePlanDownload {
        filename: format!("care_plan_{}_{}.txt", patient.mrn, order.id),
        body,
    }
}

/// Download for an order's care plan.
///
/// # Errors
///
/// `NotFound` for an unknown order, `MissingCarePlan` when none has been generated.
pub fn care_plan_download_for_order(conn: &Connection, order_id: i64) -> CarePlanResult<CarePlanDownload> {
    let detail = orders::require_order_detail(conn, order_id)?;
    let plan = care_plans::get_care_plan_for_order(conn, order_id)?.ok_or(CarePlanError::MissingCarePlan)?;
    Ok(render_care_plan_download(&detail, &plan))
}
