/// Lowercase the input and collapse non-alphanumeric runs into single dashes.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_dash = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::slugify;

    #[test]
    fn collapses_separators() {
        assert_eq!(slugify("Ferris  the -- Crab"), "ferris-the-crab");
    }

    #[test]
    fn trims_leading_and_trailing_junk() {
        assert_eq!(slugify("  Hoodie! "), "hoodie");
        assert_eq!(slugify("C++ & Rust"), "c-rust");
    }

    #[test]
    fn empty_when_nothing_usable() {
        assert_eq!(slugify("!!!"), "");
    }
}
