//! Minting: collateral reservation, payment references and proof execution

pub mod executor;
pub mod reference;
pub mod reservation;

pub use executor::{MintExecutor, MintOutcome, MintPlan};
pub use reference::{PaymentReference, ReferenceKind};
pub use reservation::{value_uba, CollateralReservation, CollateralReservationClient};
