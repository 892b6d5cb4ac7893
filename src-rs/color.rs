use image::Rgba;

use crate::error::InputError;

/// Parses `#RRGGBB`, `#RRGGBBAA`, `#RGB` or `rgba(r, g, b, a)` into a pixel.
pub fn parse_color(raw: &str) -> Result<Rgba<u8>, InputError> {
    parse_color_opt(raw).ok_or_else(|| InputError::InvalidColor(raw.to_string()))
}

fn parse_color_opt(raw: &str) -> Option<Rgba<u8>> {
    let s = raw.trim();
    if let Some(hex) = s.strip_prefix('#') {
        if !hex.is_ascii() {
            return None;
        }
        if hex.len() == 3 {
            let mut out = [0u8, 0, 0, 255];
            for (i, ch) in hex.chars().enumerate() {
                let nibble = ch.to_digit(16)? as u8;
                out[i] = nibble * 17;
            }
            return Some(Rgba(out));
        }
        if hex.len() == 6 {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            return Some(Rgba([r, g, b, 255]));
        }
        if hex.len() == 8 {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            let a = u8::from_str_radix(&hex[6..8], 16).ok()?;
            return Some(Rgba([r, g, b, a]));
        }
        return None;
    }

    let lower = s.to_ascii_lowercase();
    if lower.starts_with("rgba(") && lower.ends_with(')') {
        let body = &lower[5..lower.len() - 1];
        let parts: Vec<&str> = body.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return None;
        }
        let r = parts[0].parse::<f64>().ok()?.round().clamp(0.0, 255.0) as u8;
        let g = parts[1].parse::<f64>().ok()?.round().clamp(0.0, 255.0) as u8;
        let b = parts[2].parse::<f64>().ok()?.round().clamp(0.0, 255.0) as u8;
        let alpha_value = parts[3].parse::<f64>().ok()?;
        let a = if alpha_value <= 1.0 {
            (alpha_value * 255.0).round().clamp(0.0, 255.0) as u8
        } else {
            alpha_value.round().clamp(0.0, 255.0) as u8
        };
        return Some(Rgba([r, g, b, a]));
    }

    None
}

/// Canonical upper-case hex form, alpha omitted when opaque.
pub fn to_hex(color: Rgba<u8>) -> String {
    let [r, g, b, a] = color.0;
    if a == 255 {
        format!("#{r:02X}{g:02X}{b:02X}")
    } else {
        format!("#{r:02X}{g:02X}{b:02X}{a:02X}")
    }
}

/// Validates a color string and returns its canonical hex form.
pub fn normalize(raw: &str) -> Result<String, InputError> {
    parse_color(raw).map(to_hex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parses_hex_forms() {
        assert_eq!(parse_color("#FF0000").unwrap(), Rgba([255, 0, 0, 255]));
        assert_eq!(parse_color("#00ff0080").unwrap(), Rgba([0, 255, 0, 128]));
        assert_eq!(parse_color("#0af").unwrap(), Rgba([0, 170, 255, 255]));
    }

    #[test]
    fn parses_rgba_with_fractional_alpha() {
        assert_eq!(
            parse_color("rgba(10, 20, 30, 0.5)").unwrap(),
            Rgba([10, 20, 30, 128])
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_matches!(parse_color("red"), Err(InputError::InvalidColor(_)));
        assert_matches!(parse_color("#12345"), Err(InputError::InvalidColor(_)));
        assert_matches!(parse_color("#ééé"), Err(InputError::InvalidColor(_)));
    }

    #[test]
    fn normalize_uppercases_and_drops_opaque_alpha() {
        assert_eq!(normalize("#00ff00ff").unwrap(), "#00FF00");
        assert_eq!(normalize("rgba(0,0,0,0)").unwrap(), "#00000000");
    }
}
