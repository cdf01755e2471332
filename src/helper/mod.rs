use std::ops::BitAnd;

pub fn has_flag<U, T: Into<U>>(value: U, flag: T) -> bool
    where U: BitAnd<Output = U> + PartialEq + Copy {
    let flag = flag.into();

    value & flag == flag
}

/// Package part of an internal class name, `java/lang/String` -> `java/lang`.
pub fn package_of(name: &str) -> &str {
    let name = name.trim_start_matches('[');
    let name = name.strip_prefix('L').filter(|n| n.ends_with(';')).unwrap_or(name);

    match name.rfind('/') {
        Some(i) => &name[..i],
        None => ""
    }
}
