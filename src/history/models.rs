use chrono::{DateTime, Utc};

use crate::alerts::AlertType;

/// Subset of `{gardenId, userId, alertType, startDate, endDate}` accepted by
/// `getAlertHistory`. Any field left `None` is simply not applied to the
/// query.
#[derive(Debug, Clone, Default)]
pub struct AlertHistoryFilters {
    pub garden_id: Option<String>,
    pub user_id: Option<i64>,
    pub alert_type: Option<AlertType>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}
