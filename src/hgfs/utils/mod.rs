pub mod cpname;
pub mod metadata;
pub mod path_resolver;
