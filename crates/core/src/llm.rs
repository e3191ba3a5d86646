//! Language model clients.
//!
//! [`LlmClient`] is the seam between care plan generation and the hosted model. The production
//! client calls the Anthropic Messages API over blocking HTTP; callers run it on a blocking
//! worker thread. [`MockLlmClient`] returns a complete demonstration plan without network access.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::LlmSettings;
use crate::constants::{ANTHROPIC_API_VERSION, MOCK_LLM_MODEL};
use crate::models::OrderDetail;
use crate::{CarePlanError, CarePlanResult};

/// A single generation request.
#[derive(Clone, Copy, Debug)]
pub struct CompletionRequest<'a> {
    pub prompt: &'a str,
    /// The order being planned. Only the mock client reads it.
    pub order: &'a OrderDetail,
}

pub trait LlmClient: Send + Sync {
    /// Model identifier recorded on generated care plans.
    fn model(&self) -> &str;

    /// Run one completion and return the generated text.
    fn complete(&self, request: &CompletionRequest<'_>) -> CarePlanResult<String>;
}

/// Build the client selected by the settings.
///
/// # Errors
///
/// Returns `LlmNotConfigured` when mock mode is off and no API key is set.
pub fn client_from_settings(settings: &LlmSettings) -> CarePlanResult<Arc<dyn LlmClient>> {
    if settings.mock_mode {
        return Ok(Arc::new(MockLlmClient));
    }
    Ok(Arc::new(AnthropicClient::new(settings)?))
}

// ============================================================================
// Anthropic Messages API
// ============================================================================

/// Client for the Anthropic Messages API.
pub struct AnthropicClient {
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    timeout_secs: u64,
}

impl AnthropicClient {
    pub fn new(settings: &LlmSettings) -> CarePlanResult<Self> {
        let api_key = settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(CarePlanError::LlmNotConfigured)?;

        tracing::info!(
            model = %settings.model,
            key_length = api_key.len(),
            "Anthropic API key configured"
        );

        Ok(Self {
            api_key: api_key.to_string(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            timeout_secs: settings.timeout_secs,
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// First text block of a Messages API response body.
fn first_text_block(body: &str) -> CarePlanResult<String> {
    let parsed: MessagesResponse =
        serde_json::from_str(body).map_err(|e| CarePlanError::LlmResponse(e.to_string()))?;
    parsed
        .content
        .into_iter()
        .find(|block| block.kind == "text")
        .and_then(|block| block.text)
        .ok_or_else(|| CarePlanError::LlmResponse("response contained no text block".into()))
}

impl LlmClient for AnthropicClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn complete(&self, request: &CompletionRequest<'_>) -> CarePlanResult<String> {
        // Built per call: a blocking client must be created and dropped off the async runtime.
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| CarePlanError::LlmHttp(e.to_string()))?;

        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: [Message {
                role: "user",
                content: request.prompt,
            }],
        };

        let response = client
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    CarePlanError::LlmConnection(self.base_url.clone())
                } else if e.is_timeout() {
                    CarePlanError::LlmTimeout(self.timeout_secs)
                } else {
                    CarePlanError::LlmHttp(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response.text().map_err(|e| {
            if e.is_timeout() {
                CarePlanError::LlmTimeout(self.timeout_secs)
            } else {
                CarePlanError::LlmHttp(e.to_string())
            }
        })?;
        if !status.is_success() {
            return Err(CarePlanError::LlmApi {
                status: status.as_u16(),
                body: text,
            });
        }

        first_text_block(&text)
    }
}

// ============================================================================
// Mock mode
// ============================================================================

/// Offline client that renders a fixed demonstration care plan for the order.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockLlmClient;

impl LlmClient for MockLlmClient {
    fn model(&self) -> &str {
        MOCK_LLM_MODEL
    }

    fn complete(&self, request: &CompletionRequest<'_>) -> CarePlanResult<String> {
        Ok(render_mock_care_plan(request.order))
    }
}

fn render_mock_care_plan(detail: &OrderDetail) -> String {
    let patient_name = detail.patient.full_name();
    let generated = Utc::now().format("%Y-%m-%d %H:%M");
    let mrn = &detail.patient.mrn;
    let medication = &detail.order.medication_name;
    let diagnosis = detail.order.primary_diagnosis();

    format!(
        "# Care Plan for {patient_name}

**Generated:** {generated}
**MRN:** {mrn}
**Medication:** {medication}
**Primary Diagnosis:** {diagnosis}

---

## 1. Problem List / Drug Therapy Problems (DTPs)

1. **Need for immunomodulation** - Patient requires {medication} therapy for symptomatic control
2. **Risk of infusion-related reactions** - Headache, chills, fever, rare anaphylaxis
3. **Risk of renal dysfunction** - Monitor in susceptible patients
4. **Risk of thromboembolic events** - Rare but requires risk factor assessment
5. **Drug-drug interactions** - Review concomitant medications
6. **Patient education gap** - Ensure understanding of therapy and adverse signs

## 2. Goals (SMART)

**Primary Goal:** Achieve clinically meaningful improvement in symptoms within 2 weeks of completing therapy course.

**Safety Goals:**
- No severe infusion reactions during therapy
- No acute kidney injury (SCr increase <0.3 mg/dL within 7 days)
- No thromboembolic events during or after therapy

**Process Goals:**
- Complete full prescribed course with documented monitoring
- Document all interventions and patient education in EMR

## 3. Pharmacist Interventions / Plan

### Dosing & Administration
- **Total dose:** Calculate based on actual body weight
- **Schedule:** Per physician order and manufacturer recommendations
- **Documentation:** Record lot number and expiration of product

### Premedication
- Acetaminophen 650 mg PO 30-60 minutes prior to infusion
- Diphenhydramine 25-50 mg PO 30-60 minutes prior to infusion
- Consider low-dose corticosteroid if prior reactions

### Infusion Rates & Titration
- Start at low rate per product label (e.g., 0.5 mL/kg/hr)
- Increase stepwise every 15-30 minutes as tolerated
- Maximum rate per manufacturer specifications
- Slow or stop if any infusion reactions occur

### Hydration & Renal Protection
- Ensure adequate hydration prior to infusion
- Consider 250-500 mL normal saline if not fluid overloaded
- Monitor renal function pre-course and within 3-7 days post-completion

### Thrombosis Risk Mitigation
- Assess baseline thrombosis risk
- Encourage early ambulation and adequate hydration
- Educate patient on symptoms to report

### Concomitant Medications
- Review all current medications for interactions
- Continue supportive care medications as prescribed

## 4. Monitoring Plan & Lab Schedule

| Timepoint | Parameters to Monitor |
|-----------|----------------------|
| Before therapy | CBC, BMP (SCr, BUN), baseline vitals, assess symptoms |
| During infusion | Vitals q15 min first hour, then q30-60 min; respiratory status |
| After each infusion | Assess for delayed adverse events |
| 3-7 days post-course | BMP to check renal function |
| Clinical follow-up | 2 weeks and 6-8 weeks to assess response |

## 5. Adverse Event Management

**Mild Reaction (headache, chills, myalgia):**
- Slow infusion rate
- Give acetaminophen/antihistamine
- Observe closely

**Moderate Reaction (wheezing, hypotension, chest pain):**
- Stop infusion immediately
- Follow emergency protocol
- Notify prescriber

**Severe Reaction (anaphylaxis):**
- Stop infusion immediately
- Administer epinephrine per protocol
- Airway support
- Emergency response team

## 6. Patient Education Points

- Explain the infusion process and expected duration
- Review signs and symptoms to report immediately:
  - Chest pain, shortness of breath
  - Severe headache
  - Swelling in extremities
  - Fever, chills, rash
- Emphasize importance of adequate hydration
- Provide contact information for questions

## 7. Documentation & Communication

- Enter all interventions and education in EMR
- Document infusion details including lot numbers
- Communicate any dose modifications or adverse events to prescriber
- Coordinate with nursing team on monitoring schedule

---

*This care plan was generated based on the provided patient records and current clinical guidelines. All recommendations should be verified with the prescribing physician.*

**[MOCK MODE]** - This is a sample care plan for demonstration purposes.
"
    )
}
