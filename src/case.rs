//! Identifier case conversion used for derived names (association roles, default SQL names).

/// Convert an identifier or free-form role to PascalCase.
/// e.g. "billing address" -> "BillingAddress", "owner_id" -> "OwnerId", "buyer" -> "Buyer"
pub fn to_pascal_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut capitalize_next = true;
    for c in s.chars() {
        if c == '_' || c == '-' || c.is_whitespace() {
            capitalize_next = true;
        } else if capitalize_next {
            out.extend(c.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Convert a single identifier from camelCase/PascalCase to snake_case.
/// e.g. "userId" -> "user_id", "OrderLine" -> "order_line"
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    let mut prev_lower = false;
    for c in s.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

/// Default SQL name of a class: UPPER_SNAKE form of its name ("OrderLine" -> "ORDER_LINE").
pub fn to_upper_snake_case(s: &str) -> String {
    to_snake_case(s).to_uppercase()
}
