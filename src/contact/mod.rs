pub mod types;
pub(crate) mod parser;

pub use parser::parse_contact;
pub use types::{ProofDeclaration, ProofMethod, ProofType};
