//! Functions exported by the compute module.
//!
//! Native builds link these directly; the `wasm` feature additionally exports
//! them through wasm-bindgen for the browser artifact.

#[cfg(feature = "wasm")]
use wasm_bindgen::prelude::*;

#[cfg_attr(feature = "wasm", wasm_bindgen)]
pub fn add(a: i32, b: i32) -> i32 {
    a.wrapping_add(b)
}

#[cfg_attr(feature = "wasm", wasm_bindgen)]
pub fn sum_f32(buf: &[f32]) -> f32 {
    buf.iter().sum()
}

#[cfg_attr(feature = "wasm", wasm_bindgen)]
pub fn hello(name: &str) -> String {
    format!("Hello, {name} from Rust!")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_sums_two_integers() {
        assert_eq!(add(21, 21), 42);
        assert_eq!(add(-5, 3), -2);
    }

    #[test]
    fn add_wraps_like_wasm_i32() {
        assert_eq!(add(i32::MAX, 1), i32::MIN);
    }

    #[test]
    fn sum_f32_of_empty_buffer_is_zero() {
        assert_eq!(sum_f32(&[]), 0.0);
        assert_eq!(sum_f32(&[1.5, 2.5, -1.0]), 3.0);
    }

    #[test]
    fn hello_formats_greeting() {
        assert_eq!(hello("React"), "Hello, React from Rust!");
    }
}
