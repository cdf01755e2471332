//! Floating point to integer conversions with Java semantics: NaN becomes 0 and values
//! out of range saturate. Rust's `as` casts between floats and integers behave the same.

#[inline]
pub fn d2l(d: f64) -> i64 {
    d as i64
}

#[inline]
pub fn d2i(d: f64) -> i32 {
    d as i32
}

#[inline]
pub fn f2l(f: f32) -> i64 {
    f as i64
}

#[inline]
pub fn f2i(f: f32) -> i32 {
    f as i32
}

#[inline]
pub fn l2d(l: i64) -> f64 {
    l as f64
}

#[inline]
pub fn l2f(l: i64) -> f32 {
    l as f32
}
