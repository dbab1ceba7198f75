pub(crate) mod capture;
pub(crate) mod sync;
pub(crate) mod workspace;
