//! Job names double as workload names and log ids, so they stay within
//! the cluster's label constraints: lowercase alphanumeric segments
//! joined by `-` and `.`, at most 63 characters including the run number.

use uuid::Uuid;

/// Room left for the `.<n>` run number suffix.
const MAX_BASE_LEN: usize = 58;

const ADJECTIVES: [&str; 16] = [
    "amber", "brave", "calm", "dusty", "eager", "fancy", "gentle", "hazy", "icy", "jolly",
    "keen", "lucid", "misty", "noble", "quiet", "rusty",
];

const NOUNS: [&str; 16] = [
    "anchor", "badger", "canyon", "dingo", "falcon", "glacier", "harbor", "ibis", "jackal",
    "kestrel", "lagoon", "marmot", "otter", "pelican", "quarry", "raven",
];

/// Human-friendly random name such as `brave-otter-3fa1`.
pub fn random_name() -> String {
    let id = Uuid::new_v4();
    let bytes = id.as_bytes();
    format!(
        "{}-{}-{:02x}{:02x}",
        ADJECTIVES[usize::from(bytes[0]) % ADJECTIVES.len()],
        NOUNS[usize::from(bytes[1]) % NOUNS.len()],
        bytes[2],
        bytes[3],
    )
}

/// `refs/heads/feature/Foo_bar` becomes `feature-foo-bar`.
pub fn flatten_ref(r: &str) -> String {
    let r = r.trim();
    let r = r.strip_prefix("refs/heads/").unwrap_or(r);
    let r = r.strip_prefix("refs/tags/").unwrap_or(r);
    r.replace(['/', '_', '@'], "-").to_lowercase()
}

/// Coerce `name` into something the cluster accepts as a label value.
pub fn cleanup_name(name: &str) -> String {
    let mut name = name.trim().to_string();
    if name.is_empty() {
        name = "unknown".to_string();
    }
    if name.len() > MAX_BASE_LEN {
        let mut cut = MAX_BASE_LEN;
        while !name.is_char_boundary(cut) {
            cut -= 1;
        }
        name.truncate(cut);
    }

    name.split('.')
        .map(fix_segment)
        .collect::<Vec<_>>()
        .join(".")
}

fn fix_segment(seg: &str) -> String {
    let valid = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();

    let mut chars: Vec<char> = seg.chars().collect();
    if chars.is_empty() {
        return String::new();
    }
    if !valid(chars[0].to_ascii_lowercase()) {
        chars[0] = 'a';
    }
    let last = chars.len() - 1;
    if !valid(chars[last].to_ascii_lowercase()) {
        chars[last] = 'a';
    }
    chars.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup() {
        let cases = [
            ("this-is-an-invalid-podname-.33", "this-is-an-invalid-podnamea.33"),
            ("", "unknown"),
            ("  spaced  ", "spaced"),
            ("-leading", "aleading"),
            (
                "this-is-way-too-long-this-is-way-too-long-this-is-way-too-long",
                "this-is-way-too-long-this-is-way-too-long-this-is-way-tooa",
            ),
        ];
        for (input, expected) in cases {
            assert_eq!(cleanup_name(input), expected, "input {input:?}");
        }
    }

    #[test]
    fn flatten() {
        assert_eq!(flatten_ref("refs/heads/feature/Foo_bar"), "feature-foo-bar");
        assert_eq!(flatten_ref("refs/tags/v1.2@rc"), "v1.2-rc");
        assert_eq!(flatten_ref("main"), "main");
        assert_eq!(flatten_ref(""), "");
    }

    #[test]
    fn random_names_are_valid() {
        for _ in 0..32 {
            let n = random_name();
            assert_eq!(cleanup_name(&n), n);
            assert_eq!(n.split('-').count(), 3);
        }
    }
}
