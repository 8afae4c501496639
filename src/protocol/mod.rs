//! Signing Protocol Adapter
//!
//! The signer application is not under our control and, depending on version
//! and configuration, fetches documents and posts results in different ways:
//!
//! | Direction | Convention |
//! |-----------|------------|
//! | read | per-session URL returning the PDF |
//! | read | multiplexed endpoint, `op=get&id=<id>` |
//! | write | raw base64 body |
//! | write | form body `op=put&dat=<payload>` |
//! | write | JSON body with `dat` or `data` |
//! | write | `op=put&dat=<payload>` in the query string of a GET |
//!
//! All of them are normalized at the boundary ([`Submission`],
//! [`SignerRequest`]) and applied through the same [`SigningRelay`] operations.

pub mod params;
pub mod relay;
pub mod submission;

pub use params::{parse_pairs, Operation, Params, SignerRequest};
pub use relay::{
    signed_file_name, CreateSession, IgnoreReason, RelayConfig, SignedDocument, SignerReply,
    SigningRelay, SubmissionOutcome,
};
pub use submission::{
    classify, decode_document, encode_document, Classification, StructuredBody, Submission,
    ERROR_PREFIX,
};
