//! External system ports used by the registration saga, with in-memory implementations.

pub mod crm;
pub mod identity;
pub mod transformation;

pub use crm::{CrmMutationResult, CrmRecord, CrmService, InMemoryCrmService, SearchResult};
pub use identity::{
    CreatedIdentityUser, IdentityService, InMemoryIdentityService, NewIdentityUser,
};
pub use transformation::{InMemoryTransformer, Transformer};
