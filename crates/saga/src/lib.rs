//! Customer registration saga.
//!
//! Registers a customer across two independently owned systems: a CRM that
//! owns the business profile and an identity system that owns sessions. No
//! distributed transaction exists, so the saga compensates instead:
//!
//! 1. Search the CRM and classify the user (new, guest, manual, registered)
//! 2. Create the identity user and fetch its profile
//! 3. Transform the collected data into a CRM payload
//! 4. Create or update the CRM profile
//!
//! If anything fails after a non-guest identity user exists, that user is
//! deleted again by a fire-and-forget compensating call.

pub mod background;
pub mod classification;
pub mod coordinator;
pub mod error;
pub mod identity_segment;
pub mod model;
pub mod outcome;
pub mod policy;
pub mod services;
pub mod state;

pub use background::BackgroundTasks;
pub use classification::UserClassification;
pub use coordinator::RegistrationSaga;
pub use error::SagaError;
pub use identity_segment::{IdentitySegment, IdentitySegmentResult, RollbackTarget};
pub use model::CrmPath;
pub use outcome::SagaOutcome;
pub use policy::RegistrationPolicy;
pub use services::{
    CreatedIdentityUser, CrmMutationResult, CrmRecord, CrmService, IdentityService,
    InMemoryCrmService, InMemoryIdentityService, InMemoryTransformer, NewIdentityUser,
    SearchResult, Transformer,
};
pub use state::RegistrationStage;
