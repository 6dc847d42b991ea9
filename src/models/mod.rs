mod license_key;
mod purchase_intent;
mod subscription;

pub use license_key::*;
pub use purchase_intent::*;
pub use subscription::*;
