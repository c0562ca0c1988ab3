use serde::Serialize;

/// An application record whose changes are written to a stream
///
/// ```ignore
/// struct Product { id: u64 }
///
/// impl Record for Product {
///     type Payload = serde_json::Value;
///
///     fn redstream_payload(&self) -> Self::Payload {
///         serde_json::json!({ "id": self.id })
///     }
/// }
///
/// assert_eq!(Product::redstream_name(), "products");
/// ```
pub trait Record: 'static {
    type Payload: Serialize;

    /// The value serialized into the entry's `payload` field
    fn redstream_payload(&self) -> Self::Payload;

    /// Stream the record's changes are written to
    ///
    /// Defaults to the pluralized, snake-cased type name.
    fn redstream_name() -> String {
        default_stream_name(std::any::type_name::<Self>())
    }
}

/// Derive a stream name from a Rust type name
///
/// `my_app::models::UserRole` becomes `user_roles`.
pub fn default_stream_name(type_name: &str) -> String {
    let base = type_name.split('<').next().unwrap_or(type_name);
    let base = base.rsplit("::").next().unwrap_or(base);
    pluralize(&snake_case(base))
}

fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                // Last capital of an acronym, e.g. the R in "HTTPRequest"
                Some(p) if p.is_uppercase() => next.is_some_and(char::is_lowercase),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}

fn pluralize(word: &str) -> String {
    const SIBILANTS: [&str; 5] = ["s", "x", "z", "ch", "sh"];

    if SIBILANTS.iter().any(|suffix| word.ends_with(suffix)) {
        return format!("{}es", word);
    }

    if let Some(stem) = word.strip_suffix('y') {
        let before_y = stem.chars().last();
        if before_y.is_some_and(|c| !"aeiou".contains(c)) {
            return format!("{}ies", stem);
        }
    }

    format!("{}s", word)
}
