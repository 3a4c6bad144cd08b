//! API request handlers

pub mod campaigns;
pub mod health;
pub mod notify;
pub mod preferences;
pub mod registration;

#[cfg(test)]
pub(crate) mod test_support;
