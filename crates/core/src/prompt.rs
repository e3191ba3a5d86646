//! Prompt construction for care plan generation.
//!
//! The prompt is a fixed clinical-pharmacist template filled with the order's patient,
//! diagnosis and medication details, optionally preceded by recent care plans as few-shot
//! examples. Values are substituted in a single formatting pass, so text that looks like a
//! placeholder inside patient records is passed through literally.

use crate::constants::{MAX_EXAMPLE_LENGTH, TRUNCATION_MARKER};
use crate::models::{CarePlanWithOrder, OrderDetail};

/// Example content, cut to `MAX_EXAMPLE_LENGTH` characters with a marker when longer.
fn truncate_example(content: &str) -> String {
    match content.char_indices().nth(MAX_EXAMPLE_LENGTH) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &content[..cut]),
        None => content.to_string(),
    }
}

/// Render care plans as numbered few-shot examples.
///
/// Returns an empty string for an empty slice.
pub fn format_care_plan_examples(examples: &[CarePlanWithOrder]) -> String {
    examples
        .iter()
        .enumerate()
        .map(|(i, example)| {
            let number = i + 1;
            let detail = &example.order;
            let patient_name = detail.patient.full_name();
            let diagnosis = detail.order.primary_diagnosis();
            let medication = &detail.order.medication_name;
            let content = truncate_example(&example.care_plan.content);
            format!(
                "\n### EXAMPLE {number}\n\
                 **Patient:** {patient_name}\n\
                 **Diagnosis:** {diagnosis}\n\
                 **Medication:** {medication}\n\
                 \n\
                 **CARE PLAN OUTPUT:**\n\
                 {content}\n"
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

fn examples_section(examples: &[CarePlanWithOrder]) -> String {
    if examples.is_empty() {
        return String::new();
    }
    let examples = format_care_plan_examples(examples);
    format!(
        "## Reference Examples

Below are examples of previously generated care plans. Use these as a reference for style, structure, and level of detail. Adapt the content appropriately for the current patient.

{examples}

---

## Instructions
Generate a care plan for the patient below, following a similar style and level of detail as the examples above.

"
    )
}

fn join_or_none(values: &[impl AsRef<str>]) -> String {
    if values.is_empty() {
        return "None".to_string();
    }
    values
        .iter()
        .map(|v| v.as_ref())
        .collect::<Vec<&str>>()
        .join(", ")
}

/// Build the full generation prompt for an order.
///
/// # Arguments
///
/// * `detail` - Order with its patient and provider.
/// * `examples` - Recent care plans from other orders; the reference section is omitted when
///   empty.
pub fn build_care_plan_prompt(detail: &OrderDetail, examples: &[CarePlanWithOrder]) -> String {
    let example_section = examples_section(examples);
    let order = &detail.order;
    let patient_name = detail.patient.full_name();
    let mrn = &detail.patient.mrn;
    let primary_diagnosis = order.primary_diagnosis();
    let additional_diagnoses = join_or_none(&order.additional_diagnoses);
    let medication_name = &order.medication_name;
    let medication_history = join_or_none(&order.medication_history);
    let patient_records = &order.patient_records;

    format!(
        "You are a clinical pharmacist assistant. Based on the patient records provided, generate a comprehensive care plan following clinical guidelines.
{example_section}

## Patient Information
- Name: {patient_name}
- MRN: {mrn}
- Primary Diagnosis: {primary_diagnosis}
- Additional Diagnoses: {additional_diagnoses}
- Current Medication: {medication_name}
- Medication History: {medication_history}

## Patient Records
{patient_records}

## Required Output Format

Generate a detailed care plan with the following sections:

### 1. Problem List / Drug Therapy Problems (DTPs)
Identify all drug therapy problems including:
- Need for additional therapy
- Unnecessary therapy
- Ineffective drug therapy
- Dosage too low/high
- Adverse drug reactions
- Non-adherence
- Drug interactions

### 2. Goals (SMART)
**Primary Goal:** [Specific clinical outcome]
**Safety Goals:** [Adverse event prevention targets]
**Process Goals:** [Treatment completion targets]

### 3. Pharmacist Interventions / Plan

**Dosing & Administration**
- Verify total dose calculations
- Document administration schedule

**Premedication**
- Recommended premedications with doses and timing

**Infusion Rates & Titration** (if applicable)
- Starting rate
- Titration schedule
- Maximum rate

**Hydration & Renal Protection**
- Fluid recommendations
- Renal function monitoring

**Thrombosis Risk Mitigation**
- Risk assessment
- Prophylactic measures

**Concomitant Medications**
- Continue/adjust recommendations for other medications

### 4. Monitoring Plan & Lab Schedule

| Timepoint | Parameters to Monitor |
|-----------|----------------------|
| Before therapy | [Labs, vitals, assessments] |
| During therapy | [Monitoring frequency and parameters] |
| Post-therapy | [Follow-up schedule] |

### 5. Adverse Event Management
- Mild reactions: [Protocol]
- Moderate reactions: [Protocol]
- Severe reactions: [Protocol]

### 6. Patient Education Points
- Key information for patient understanding
- Signs/symptoms to report
- Lifestyle considerations

### 7. Documentation & Communication
- Required documentation
- Communication with care team

Be specific, evidence-based, and follow current clinical guidelines. Include relevant dosing calculations where applicable."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::open_memory_database;
    use crate::models::NewCarePlan;
    use crate::repositories::{care_plans, orders, providers, test_support};
    use chrono::{Duration, Utc};

    fn setup_example(
        conn: &rusqlite::Connection,
        first: &str,
        mrn: &str,
        content: &str,
        hours_ago: i64,
    ) -> CarePlanWithOrder {
        let provider = match providers::find_provider_by_npi(conn, "1111111111").unwrap() {
            Some(p) => p,
            None => test_support::provider(conn, "Dr. A", "1111111111"),
        };
        let patient = test_support::patient(conn, first, "Doe", mrn, (1980, 1, 15));
        let order = test_support::order(conn, &patient, &provider, "IVIG");
        let plan = care_plans::insert_care_plan(
            conn,
            order.id,
            &NewCarePlan {
                content: content.into(),
                model_used: "m".into(),
                generation_time_ms: None,
            },
            Utc::now() - Duration::hours(hours_ago),
        )
        .unwrap();
        care_plans::get_care_plan_with_order(conn, plan.id).unwrap().unwrap()
    }

    #[test]
    fn test_format_examples_empty_is_empty_string() {
        assert_eq!(format_care_plan_examples(&[]), "");
    }

    #[test]
    fn test_format_examples_numbers_and_separates() {
        let conn = open_memory_database().unwrap();
        let a = setup_example(&conn, "Alice", "111111", "Plan A", 2);
        let b = setup_example(&conn, "Bob", "222222", "Plan B", 1);

        let text = format_care_plan_examples(&[b, a]);
        assert!(text.starts_with("\n### EXAMPLE 1\n**Patient:** Bob Doe\n"));
        assert!(text.contains("**Diagnosis:** G70.00 - Myasthenia gravis\n**Medication:** IVIG\n"));
        assert!(text.contains("**CARE PLAN OUTPUT:**\nPlan B\n\n---\n\n### EXAMPLE 2\n**Patient:** Alice Doe"));
        assert!(text.ends_with("Plan A\n"));
    }

    #[test]
    fn test_long_examples_are_truncated() {
        let conn = open_memory_database().unwrap();
        let long = "é".repeat(MAX_EXAMPLE_LENGTH + 10);
        let example = setup_example(&conn, "Alice", "111111", &long, 1);

        let text = format_care_plan_examples(&[example]);
        let expected = format!("{}{TRUNCATION_MARKER}\n", "é".repeat(MAX_EXAMPLE_LENGTH));
        assert!(text.ends_with(&expected));

        let exact = "x".repeat(MAX_EXAMPLE_LENGTH);
        assert_eq!(truncate_example(&exact), exact);
    }

    #[test]
    fn test_prompt_without_examples_has_no_reference_section() {
        let conn = open_memory_database().unwrap();
        let provider = test_support::provider(&conn, "Dr. A", "1111111111");
        let patient = test_support::patient(&conn, "John", "Doe", "123456", (1980, 1, 15));
        let order = test_support::order(&conn, &patient, &provider, "IVIG");
        let detail = orders::require_order_detail(&conn, order.id).unwrap();

        let prompt = build_care_plan_prompt(&detail, &[]);
        assert!(!prompt.contains("## Reference Examples"));
        assert!(prompt.contains("- Name: John Doe\n- MRN: 123456\n"));
        assert!(prompt.contains("- Additional Diagnoses: None\n"));
        assert!(prompt.contains("- Medication History: None\n"));
        assert!(prompt.contains("## Patient Records\nTest records\n"));
        assert!(prompt.contains("### 7. Documentation & Communication"));
    }

    #[test]
    fn test_prompt_with_examples_and_lists() {
        let conn = open_memory_database().unwrap();
        let example = setup_example(&conn, "Alice", "111111", "Example plan", 1);
        let provider = providers::find_provider_by_npi(&conn, "1111111111")
            .unwrap()
            .unwrap();
        let patient = test_support::patient(&conn, "John", "Doe", "123456", (1980, 1, 15));
        let mut new = test_support::new_order(&patient, &provider, "Rituximab");
        new.additional_diagnoses = vec![careplan_types::Icd10Code::parse("I10").unwrap()];
        new.medication_history = vec!["Prednisone".into(), "IVIG".into()];
        let order = orders::insert_order(&conn, &new).unwrap();
        let detail = orders::require_order_detail(&conn, order.id).unwrap();

        let prompt = build_care_plan_prompt(&detail, &[example]);
        assert!(prompt.contains("## Reference Examples"));
        assert!(prompt.contains("**CARE PLAN OUTPUT:**\nExample plan"));
        assert!(prompt.contains("- Additional Diagnoses: I10\n"));
        assert!(prompt.contains("- Medication History: Prednisone, IVIG\n"));
        let reference = prompt.find("## Reference Examples").unwrap();
        let patient_info = prompt.find("## Patient Information").unwrap();
        assert!(reference < patient_info);
    }

    #[test]
    fn test_placeholder_text_in_records_is_not_substituted() {
        let conn = open_memory_database().unwrap();
        let provider = test_support::provider(&conn, "Dr. A", "1111111111");
        let patient = test_support::patient(&conn, "John", "Doe", "123456", (1980, 1, 15));
        let mut new = test_support::new_order(&patient, &provider, "IVIG");
        new.patient_records = "Notes mention {mrn} and {patient_name}".into();
        let order = orders::insert_order(&conn, &new).unwrap();
        let detail = orders::require_order_detail(&conn, order.id).unwrap();

        let prompt = build_care_plan_prompt(&detail, &[]);
        assert!(prompt.contains("Notes mention {mrn} and {patient_name}"));
    }
}
