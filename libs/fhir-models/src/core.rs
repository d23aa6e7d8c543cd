use crate::schema::TypeRegistry;
use once_cell::sync::Lazy;

static CORE: Lazy<TypeRegistry> = Lazy::new(|| {
    TypeRegistry::from_schema_json(include_str!("../definitions/r4-core.json"))
        .expect("failed to load embedded r4-core.json")
});

/// Registry for the bundled R4 core types
pub fn core_registry() -> &'static TypeRegistry {
    &CORE
}
