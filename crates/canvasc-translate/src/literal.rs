//! Number and string literal spellings per target.

/// Literal syntax family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Lua,
    Cpp,
}

/// Spells `value` so that the target reads back the exact same double.
pub fn number(value: f64, dialect: Dialect) -> String {
    if value.is_nan() {
        return match dialect {
            Dialect::Lua => "(0/0)".to_string(),
            Dialect::Cpp => "std::numeric_limits<double>::quiet_NaN()".to_string(),
        };
    }
    if value.is_infinite() {
        let inf = match dialect {
            Dialect::Lua => "math.huge",
            Dialect::Cpp => "std::numeric_limits<double>::infinity()",
        };
        return if value > 0.0 {
            inf.to_string()
        } else {
            format!("(-{inf})")
        };
    }

    // Debug formatting is the shortest text that round-trips and always
    // carries a decimal point or exponent, so both targets read a double.
    let text = format!("{value:?}");
    if value.is_sign_negative() {
        format!("({text})")
    } else {
        text
    }
}

/// Quotes and escapes `value` as a string literal.
pub fn string(value: &str, dialect: Dialect) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => match dialect {
                Dialect::Lua => out.push_str(&format!("\\{:03}", c as u32)),
                Dialect::Cpp => out.push_str(&format!("\\{:03o}", c as u32)),
            },
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
