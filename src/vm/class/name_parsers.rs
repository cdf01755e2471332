use crate::vm::class::field::FieldType;
use crate::vm::class::method::MethodDescriptor;
use crate::vm::error::{Exception, ThrowableKind};

fn format_error(descriptor: &str) -> Exception {
    Exception::new(ThrowableKind::ClassFormatError, format!("Invalid descriptor: {}", descriptor))
}

impl FieldType {
    /// Parses one field type from the front of `str`, returning the rest.
    fn parse_prefix(str: &str, allow_void: bool) -> Option<(FieldType, &str)> {
        let first = str.chars().next()?;
        let rest = &str[first.len_utf8()..];

        let ty = match first {
            'B' => FieldType::B,
            'C' => FieldType::C,
            'D' => FieldType::D,
            'F' => FieldType::F,
            'I' => FieldType::I,
            'J' => FieldType::J,
            'S' => FieldType::S,
            'Z' => FieldType::Z,
            'V' if allow_void => FieldType::V,
            'L' => {
                let end = rest.find(';')?;
                let name = &rest[..end];
                if name.is_empty() || name.contains(|c| c == '(' || c == ')' || c == '[') {
                    return None;
                }
                return Some((FieldType::L(name.to_string()), &rest[end + 1..]));
            }
            '[' => {
                let (component, rest) = Self::parse_prefix(rest, false)?;
                return Some((FieldType::A(Box::new(component)), rest));
            }
            _ => return None
        };

        Some((ty, rest))
    }

    pub fn parse(str: &str) -> Result<Self, Exception> {
        match Self::parse_prefix(str, false) {
            Some((ty, "")) => Ok(ty),
            _ => Err(format_error(str))
        }
    }
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> Result<Self, Exception> {
        let mut str = descriptor.strip_prefix('(').ok_or_else(|| format_error(descriptor))?;

        let mut parameters = vec![];
        while !str.starts_with(')') {
            let (param, rest) = FieldType::parse_prefix(str, false)
                .ok_or_else(|| format_error(descriptor))?;
            parameters.push(param);
            str = rest;
        }

        match FieldType::parse_prefix(&str[1..], true) {
            Some((ret, "")) => Ok(MethodDescriptor { parameters, ret }),
            _ => Err(format_error(descriptor))
        }
    }
}
