//! Feature encoding for vehicle price models.
//!
//! - [`FeatureRecord`]: validated raw input (request body or dataset row)
//! - [`CategoricalSpec`] / [`FeatureLayout`]: declared one-hot rules per field
//! - [`Schema`]: ordered column list a model was fit against
//! - [`FeatureCodec`]: record → [`EncodedVector`] in a schema's exact order

pub mod codec;
pub mod record;
pub mod schema;

pub use codec::{EncodedVector, FeatureCodec};
pub use record::{fields, FeatureRecord, Make, StockType, Transmission, MAKE_VOCABULARY};
pub use schema::{
    CategoricalSpec, DropPolicy, FeatureLayout, Schema, UnseenPolicy, MAKE, STOCK_TYPE,
    TRANSMISSION,
};
