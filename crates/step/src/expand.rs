//! `${VAR}` expansion against an invocation environment

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Replace every `${NAME}` in `input` with its value in `env`.
///
/// Undefined variables expand to the empty string. Anything that is not a
/// well-formed placeholder (`$NAME`, `${`, `${1X}`) is kept verbatim.
#[must_use]
pub fn expand(input: &str, env: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(input, |caps: &Captures<'_>| {
            env.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_expand_defined() {
        let env = env(&[("JOB_NAME", "nightly")]);
        assert_eq!(expand("${JOB_NAME}-rc", &env), "nightly-rc");
    }

    #[test]
    fn test_expand_undefined_is_empty() {
        assert_eq!(expand("${UNKNOWN}", &BTreeMap::new()), "");
        assert_eq!(expand("v${UNKNOWN}.1", &BTreeMap::new()), "v.1");
    }

    #[test]
    fn test_expand_multiple() {
        let env = env(&[("MAJOR", "2"), ("BUILD_NUMBER", "17")]);
        assert_eq!(expand("${MAJOR}.0.${BUILD_NUMBER}", &env), "2.0.17");
    }

    #[test]
    fn test_malformed_tokens_left_alone() {
        let env = env(&[("NAME", "x")]);
        assert_eq!(expand("$NAME", &env), "$NAME");
        assert_eq!(expand("${NAME", &env), "${NAME");
        assert_eq!(expand("${1X}", &env), "${1X}");
        assert_eq!(expand("${}", &env), "${}");
    }

    #[test]
    fn test_value_is_not_reexpanded() {
        let env = env(&[("A", "${B}"), ("B", "b")]);
        assert_eq!(expand("${A}", &env), "${B}");
    }

    proptest! {
        #[test]
        fn prop_no_placeholder_is_identity(s in "[^$]*") {
            let env = env(&[("JOB_NAME", "nightly")]);
            prop_assert_eq!(expand(&s, &env), s);
        }

        #[test]
        fn prop_dollar_without_brace_is_identity(s in "[a-zA-Z0-9 .$-]*") {
            prop_assume!(!s.contains("${"));
            prop_assert_eq!(expand(&s, &BTreeMap::new()), s);
        }
    }
}
