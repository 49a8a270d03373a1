/// `?,?,?` placeholder list for an SQL `IN (...)` clause with `count` values
pub fn build_in_clause_placeholders(count: usize) -> String {
    vec!["?"; count].join(",")
}
