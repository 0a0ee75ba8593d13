/// Cuts a JSON document out of a model answer that may be wrapped in prose or
/// markdown fences. Arrays win over objects so that patch answers survive.
pub fn clean_json_output(raw: &str) -> String {
    if let (Some(start), Some(end)) = (raw.find('['), raw.rfind(']')) {
        let object_first = raw.find('{').is_some_and(|brace| brace < start);
        if !object_first && start < end {
            return raw[start..=end].to_string();
        }
    }
    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if start < end {
            return raw[start..=end].to_string();
        }
    }
    raw.trim().to_string()
}
