#![no_main]
use libfuzzer_sys::fuzz_target;
use orefield_core::test_utils::standard_registry;
use orefield_core::world::World;

fuzz_target!(|data: &[u8]| {
    // Must not panic. Anything that decodes must also validate.
    if let Ok(world) = World::deserialize(data, standard_registry()) {
        assert!(world.validate().is_ok());
    }
});
