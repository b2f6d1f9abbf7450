pub mod actions;
pub mod effect;
pub mod regards;

#[cfg(not(target_arch = "wasm32"))]
pub mod backend;
#[cfg(not(target_arch = "wasm32"))]
pub mod chain;
#[cfg(not(target_arch = "wasm32"))]
pub mod store;
#[cfg(not(target_arch = "wasm32"))]
pub mod wire;

#[cfg(target_arch = "wasm32")]
pub mod effect_dom;
#[cfg(target_arch = "wasm32")]
pub mod frontend;
