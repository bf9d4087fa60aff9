pub mod resource_counter;
pub mod resource_profile;
