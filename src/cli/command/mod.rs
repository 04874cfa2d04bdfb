pub mod once;
pub mod run;

pub use once::once;
pub use run::run;
