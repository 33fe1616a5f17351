pub mod assets;
pub mod change_hub;
