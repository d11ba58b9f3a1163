/// Characters treated as interchangeable username separators.
const SEPARATORS: [char; 3] = ['.', '_', '-'];

/// Candidate usernames derived from a comma-separated query, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsernamePermutations(Vec<String>);

impl UsernamePermutations {
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn contains(&self, candidate: &str) -> bool {
        self.0.iter().any(|existing| existing == candidate)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn insert(&mut self, candidate: String) {
        if !self.contains(&candidate) {
            self.0.push(candidate);
        }
    }
}

impl<'a> IntoIterator for &'a UsernamePermutations {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Splits a query on commas into trimmed, non-empty tokens.
pub fn split_query(query: &str) -> Vec<&str> {
    query
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .collect()
}

fn replace_separators(token: &str, replacement: &str) -> String {
    token.replace(SEPARATORS, replacement)
}

/// Expands every token of `query` into itself plus, for tokens containing a
/// separator, the stripped, `_`, `-` and `.` joined variants.
pub fn generate(query: &str) -> UsernamePermutations {
    let mut permutations = UsernamePermutations::default();

    for username in split_query(query) {
        permutations.insert(username.to_string());

        if username.contains(SEPARATORS) {
            permutations.insert(replace_separators(username, ""));
            permutations.insert(replace_separators(username, "_"));
            permutations.insert(replace_separators(username, "-"));
            permutations.insert(replace_separators(username, "."));
        }
    }

    permutations
}
