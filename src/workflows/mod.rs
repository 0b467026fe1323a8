pub mod admissions;
pub mod registrar;
