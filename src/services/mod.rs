pub mod notifier;

pub use notifier::{NotificationService, NotifierHandle};
