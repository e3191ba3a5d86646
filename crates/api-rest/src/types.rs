//! Request and response bodies for the REST API.

use careplan_core::duplicates::DuplicateResult;
use careplan_core::models::{CarePlan, CarePlanWithOrder, OrderDetail, OrderStatus, Patient, Provider};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListOrdersRes {
    pub orders: Vec<OrderDetail>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateOrderRes {
    pub order: OrderDetail,
    /// Provider, patient and order warnings, in that order.
    pub warnings: Vec<DuplicateResult>,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderDetailRes {
    pub order: OrderDetail,
    pub care_plan: Option<CarePlan>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GenerateCarePlanRes {
    pub care_plan: CarePlan,
    /// True when an earlier plan for the order was replaced.
    pub regenerated: bool,
    pub message: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct CheckProviderReq {
    pub provider_name: String,
    pub provider_npi: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckProviderRes {
    /// Provider already registered under the NPI, reused by new orders.
    pub existing: Option<Provider>,
    pub result: DuplicateResult,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct CheckPatientReq {
    pub patient_first_name: String,
    pub patient_last_name: String,
    pub patient_mrn: String,
    /// `YYYY-MM-DD`; ignored when it does not parse.
    pub patient_dob: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckPatientRes {
    /// Patient already registered under the MRN, reused by new orders.
    pub existing: Option<Patient>,
    pub result: DuplicateResult,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct CheckOrderReq {
    pub patient_id: i64,
    pub medication_name: String,
    pub exclude_id: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckOrderRes {
    pub result: DuplicateResult,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CarePlanRes {
    pub care_plan: CarePlan,
    pub order: OrderDetail,
}

impl From<CarePlanWithOrder> for CarePlanRes {
    fn from(value: CarePlanWithOrder) -> Self {
        Self {
            care_plan: value.care_plan,
            order: value.order,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EditCarePlanReq {
    pub content: String,
}

// ----------------------------------------------------------------------------
// Admin console
// ----------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Case-insensitive text filter.
    pub q: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderFilterQuery {
    pub q: Option<String>,
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CarePlanFilterQuery {
    /// Exact model identifier.
    pub model: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListProvidersRes {
    pub providers: Vec<Provider>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListPatientsRes {
    pub patients: Vec<Patient>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListCarePlansRes {
    pub care_plans: Vec<CarePlanRes>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProviderReq {
    pub name: String,
    pub npi: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UpdateProviderRes {
    pub provider: Provider,
    pub warnings: Vec<DuplicateResult>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePatientReq {
    pub first_name: String,
    pub last_name: String,
    pub mrn: String,
    /// `YYYY-MM-DD`
    pub dob: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UpdatePatientRes {
    pub patient: Patient,
    pub warnings: Vec<DuplicateResult>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteRes {
    pub success: bool,
    /// Orders removed along with a deleted patient.
    pub orders_removed: usize,
}
