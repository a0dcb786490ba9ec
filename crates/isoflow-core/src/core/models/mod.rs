//! Typed data shared by every stage of a sweep: parameter values, parameter and
//! job records, opaque keys, and the charge-method vocabulary.

pub mod charge;
pub mod keys;
pub mod record;
pub mod value;
