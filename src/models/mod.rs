//! Data model shared by adapters, expectations and checkers.

pub mod page;
pub mod resource;
pub mod schema;

pub use page::{ListQuery, Page};
pub use resource::{lookup_path, CollectionScope, IdRule, Resource, ResourceKind, ResourceRef, View};
pub use schema::{
    FieldSpec, FieldType, FilterField, FilterFieldKind, ResourceSchema, SchemaOverride,
    SchemaRegistry, SchemaSource, StaticSchemaSource,
};
