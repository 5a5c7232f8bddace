pub mod appeal;
pub mod booking;
pub mod notification;
pub mod release;
pub mod settings;

pub use appeal::{AppealDecision, AppealReason, AppealStatus, ChargeAppeal};
pub use booking::{Booking, BookingStatus, CaptureStatus, NewBooking, PaymentStatus};
pub use notification::{
    Channels, Notification, NotificationCategory, NotificationPreferences, StoredNotification,
};
pub use release::{PaymentRelease, ReleaseType};
pub use settings::PlatformSettings;
