pub mod email;
pub mod event;
pub mod file;
pub mod unsubscribe;
pub mod user;

pub use email::{DeliveryStage, Email, EmailPatch};
pub use event::{ProviderEvent, TrackerEvent};
pub use file::StoredFile;
pub use unsubscribe::{NewUnsubscribe, Unsubscribe};
pub use user::{SendMethod, User};
