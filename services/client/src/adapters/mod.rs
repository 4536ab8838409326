pub mod db;
pub mod identity;
pub mod location;
pub mod schedule;

pub use db::PgProfileAdapter;
pub use identity::{DeliveredCode, LocalIdentityAdapter};
pub use location::DeviceLocationAdapter;
pub use schedule::BundledScheduleAdapter;
