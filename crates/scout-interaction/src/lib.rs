//! HTTP clients for Scout's external collaborators: text generation, web
//! lookup, embeddings, and the nearest-neighbor index.
//!
//! Configuration priority follows the environment-variable convention; every
//! client carries a per-request timeout and maps transport failures into the
//! engine's structured error taxonomy.

mod chat_generator;
mod google_web_lookup;
mod http;
mod http_embedder;
mod http_neighbor_index;

pub use chat_generator::ChatCompletionGenerator;
pub use google_web_lookup::GoogleWebLookup;
pub use http_embedder::HttpEmbedder;
pub use http_neighbor_index::HttpNeighborIndex;
