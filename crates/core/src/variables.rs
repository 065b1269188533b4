//! Variable store used to offload oversized function results.

/// Holds content that is too large to keep inline in the chat log.
///
/// The chat log keeps a short reference (`${name}`) in place of the content.
pub trait VariableStore: Send + Sync {
    /// Whether `content` is large enough that it should be offloaded.
    fn should_save(&self, content: &str) -> bool;

    /// Store `content` under a name derived from `key` and return the
    /// reference token to put in the chat log.
    fn save(&mut self, key: &str, content: String) -> String;

    /// Look up a stored variable by name.
    fn get(&self, name: &str) -> Option<&str>;

    /// Replace every `${name}` that names a stored variable with its content,
    /// escaped for use inside a JSON string. Unknown names are left alone.
    fn expand(&self, raw: &str) -> String {
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let value = after.find('}').and_then(|end| self.get(&after[..end]).map(|v| (end, v)));
            match value {
                Some((end, value)) => {
                    out.push_str(&json_escape(value));
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str("${");
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// The reference token written into the chat for a variable.
pub fn reference(name: &str) -> String {
    format!("${{{name}}}")
}

fn json_escape(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}
