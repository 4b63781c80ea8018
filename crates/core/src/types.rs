/// Column identifier. Rules, cells and cell keys are all addressed by it.
pub type FieldName = String;

/// All wall-clock timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Pass-through column holding the row's delete affordance. Never validated.
pub const FIELD_DELETE_ACTION: &str = "DeleteAction";

/// Pass-through column mirroring the row's joined error text. Never validated.
pub const FIELD_VALID_ALERTS: &str = "ValidAlerts";

/// Columns the engine treats as reserved pass-through data.
pub const RESERVED_FIELDS: [&str; 2] = [FIELD_DELETE_ACTION, FIELD_VALID_ALERTS];

/// Whether `field` names one of the reserved pass-through columns.
pub fn is_reserved_field(field: &str) -> bool {
    RESERVED_FIELDS.contains(&field)
}
