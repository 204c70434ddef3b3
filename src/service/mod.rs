pub(crate) mod category;
pub(crate) mod question;
pub(crate) mod quiz;
pub(crate) mod upload;
