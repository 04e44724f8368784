// LogWarden - core/sanitize.rs
//
// Neutralises characters that the chat output surface interprets: backticks
// (code fences) and '@' (mentions). A zero-width joiner is placed after each
// of them, unless one is already there, so sanitizing twice is a no-op.

use crate::core::model::{FieldMap, PiracyHit, ProductDescriptor};
use crate::util::constants::ZERO_WIDTH_JOINER;

fn is_active(c: char) -> bool {
    c == '`' || c == '@'
}

/// Sanitize a single value.
pub fn sanitize(value: &str) -> String {
    if !value.chars().any(is_active) {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len() + 8);
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        out.push(c);
        if is_active(c) && chars.peek() != Some(&ZERO_WIDTH_JOINER) {
            out.push(ZERO_WIDTH_JOINER);
        }
    }
    out
}

pub fn sanitize_fields(fields: &FieldMap) -> FieldMap {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), sanitize(v)))
        .collect()
}

pub fn sanitize_product(product: &ProductDescriptor) -> ProductDescriptor {
    ProductDescriptor {
        serial: product.serial.as_deref().map(sanitize),
        title: product.title.as_deref().map(sanitize),
        commit: product.commit.as_deref().map(sanitize),
        ..product.clone()
    }
}

pub fn sanitize_piracy(hit: &PiracyHit) -> PiracyHit {
    PiracyHit {
        trigger: sanitize(&hit.trigger),
        context: sanitize(&hit.context),
        ..hit.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breaks_fences_and_mentions() {
        assert_eq!(sanitize("```@everyone"), "`\u{200d}`\u{200d}`\u{200d}@\u{200d}everyone");
    }

    #[test]
    fn test_plain_value_untouched() {
        assert_eq!(sanitize("Recompiler (LLVM)"), "Recompiler (LLVM)");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let mut fields = FieldMap::new();
        fields.insert("gpu".to_string(), "`GTX` @here".to_string());
        fields.insert("build".to_string(), "RPCS3 v0.0.5".to_string());
        fields.insert("edge".to_string(), "trailing`".to_string());

        let once = sanitize_fields(&fields);
        let twice = sanitize_fields(&once);
        assert_eq!(once, twice);
        assert_ne!(once, fields);
    }
}
