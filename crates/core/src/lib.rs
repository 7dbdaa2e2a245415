pub mod clock;
pub mod error;
pub mod field_value;
pub mod ids;
pub mod role;
pub mod row;
pub mod schema;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CoreError;
pub use field_value::FieldValue;
pub use ids::*;
pub use role::Role;
pub use row::{KeyScheme, Row, RowKey};
pub use schema::{FieldAccess, FieldKind, FieldSpec, Schema, ValueRejection};
