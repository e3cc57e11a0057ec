//! Authorization port for privileged actions.

use crate::domain::error::PicklabError;

pub trait AuthPort {
    /// `Ok(())` when `credential` may perform `action`, otherwise
    /// [`PicklabError::Unauthorized`].
    fn authorize(&self, action: &str, credential: Option<&str>) -> Result<(), PicklabError>;
}
