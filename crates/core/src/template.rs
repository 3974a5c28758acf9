//! Communication template rendering.
//!
//! Templates use `{{ name }}` placeholders. Whitespace inside the braces is
//! ignored. There is no escaping and no logic; a template either renders
//! completely or fails.

use std::collections::HashMap;

use thiserror::Error;

/// Customer's display name (falls back to the email address).
pub const VAR_CUSTOMER_NAME: &str = "customer_name";
/// Customer's email address.
pub const VAR_CUSTOMER_EMAIL: &str = "customer_email";
/// Seller's store name.
pub const VAR_SELLER_NAME: &str = "seller_name";

/// Variables every template may use.
pub const STANDARD_VARS: &[&str] = &[VAR_CUSTOMER_NAME, VAR_CUSTOMER_EMAIL, VAR_SELLER_NAME];

/// Template errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unknown placeholder '{0}'")]
    UnknownPlaceholder(String),
    #[error("unterminated placeholder starting at byte {0}")]
    Unterminated(usize),
    #[error("empty placeholder at byte {0}")]
    EmptyPlaceholder(usize),
}

/// Piece of a parsed template.
enum Segment<'a> {
    Text(&'a str),
    Var(&'a str),
}

fn parse(template: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    let mut segments = Vec::new();
    let mut rest = template;
    let mut offset = 0;

    while let Some(open) = rest.find("{{") {
        let (text, after_open) = rest.split_at(open);
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }
        let start = offset + open;
        let body = after_open.get(2..).unwrap_or_default();
        let close = body.find("}}").ok_or(TemplateError::Unterminated(start))?;
        let (name, after_body) = body.split_at(close);
        let name = name.trim();
        if name.is_empty() {
            return Err(TemplateError::EmptyPlaceholder(start));
        }
        segments.push(Segment::Var(name));

        let consumed = open + 2 + close + 2;
        offset += consumed;
        rest = after_body.get(2..).unwrap_or_default();
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
    Ok(segments)
}

/// Substitute every placeholder in `template` from `vars`.
///
/// # Errors
///
/// Returns [`TemplateError`] for an unterminated `{{`, an empty placeholder,
/// or a name missing from `vars`.
pub fn render<S: AsRef<str>>(
    template: &str,
    vars: &HashMap<&str, S>,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    for segment in parse(template)? {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Var(name) => {
                let value = vars
                    .get(name)
                    .ok_or_else(|| TemplateError::UnknownPlaceholder(name.to_owned()))?;
                out.push_str(value.as_ref());
            }
        }
    }
    Ok(out)
}

/// Check that a template only uses [`STANDARD_VARS`].
///
/// # Errors
///
/// Same as [`render`].
pub fn validate(template: &str) -> Result<(), TemplateError> {
    for segment in parse(template)? {
        if let Segment::Var(name) = segment
            && !STANDARD_VARS.contains(&name)
        {
            return Err(TemplateError::UnknownPlaceholder(name.to_owned()));
        }
    }
    Ok(())
}

/// Build the standard variable map.
#[must_use]
pub fn standard_vars<'a>(
    customer_name: Option<&'a str>,
    customer_email: &'a str,
    seller_name: &'a str,
) -> HashMap<&'static str, &'a str> {
    HashMap::from([
        (
            VAR_CUSTOMER_NAME,
            customer_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or(customer_email),
        ),
        (VAR_CUSTOMER_EMAIL, customer_email),
        (VAR_SELLER_NAME, seller_name),
    ])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_with_whitespace() {
        let vars = standard_vars(Some("Ada"), "ada@example.com", "Pixel Press");
        let out = render("Hi {{customer_name}}, thanks from {{  seller_name }}!", &vars).unwrap();
        assert_eq!(out, "Hi Ada, thanks from Pixel Press!");
    }

    #[test]
    fn test_blank_name_falls_back_to_email() {
        let vars = standard_vars(Some("  "), "ada@example.com", "Pixel Press");
        assert_eq!(render("{{ customer_name }}", &vars).unwrap(), "ada@example.com");
    }

    #[test]
    fn test_unknown_placeholder() {
        let vars = standard_vars(None, "ada@example.com", "Pixel Press");
        assert_eq!(
            render("Code: {{ coupon_code }}", &vars),
            Err(TemplateError::UnknownPlaceholder("coupon_code".into()))
        );
    }

    #[test]
    fn test_unterminated_and_empty() {
        let vars: HashMap<&str, &str> = HashMap::new();
        assert_eq!(
            render("Hello {{ name", &vars),
            Err(TemplateError::Unterminated(6))
        );
        assert_eq!(
            render("ab{{ }}", &vars),
            Err(TemplateError::EmptyPlaceholder(2))
        );
    }

    #[test]
    fn test_offsets_after_first_placeholder() {
        let vars = HashMap::from([("a", "x")]);
        assert_eq!(
            render("{{a}} {{b", &vars),
            Err(TemplateError::Unterminated(6))
        );
    }

    #[test]
    fn test_plain_text_passes_through() {
        let vars: HashMap<&str, String> = HashMap::new();
        assert_eq!(render("no braces } here", &vars).unwrap(), "no braces } here");
    }

    #[test]
    fn test_validate() {
        assert!(validate("Dear {{ customer_name }} <{{customer_email}}>").is_ok());
        assert!(validate("{{ order_total }}").is_err());
    }
}
