//! Pure template substitution (spec §4.1). `render` is a pure function:
//! conditionals, then fallbacks, then spintax, then plain variables, in
//! that fixed order. No I/O, no suspension points (spec §5).

use regex::Regex;
use std::collections::HashMap;

/// How spintax selects among options. Production sends draw uniformly at
/// random; preview/tests use a deterministic index (spec §4.1, §9).
pub enum SpintaxSelector {
    Random,
    Deterministic(usize),
}

impl SpintaxSelector {
    fn pick(&self, option_count: usize) -> usize {
        match self {
            SpintaxSelector::Deterministic(idx) => idx % option_count,
            SpintaxSelector::Random => rand::Rng::gen_range(&mut rand::thread_rng(), 0..option_count),
        }
    }
}

/// camelCase <-> snake_case so both forms resolve (spec §4.1 "known
/// variables ... resolvable in both camelCase and snake_case forms").
fn to_snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, c) in key.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn to_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut cap_next = false;
    for c in key.chars() {
        if c == '_' {
            cap_next = true;
        } else if cap_next {
            out.extend(c.to_uppercase());
            cap_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn resolve<'a>(vars: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    vars.get(key)
        .or_else(|| vars.get(&to_snake_case(key)))
        .or_else(|| vars.get(&to_camel_case(key)))
        .map(|s| s.as_str())
}

fn is_truthy(vars: &HashMap<String, String>, key: &str) -> bool {
    resolve(vars, key).is_some_and(|v| !v.trim().is_empty())
}

fn process_conditionals(text: &str, vars: &HashMap<String, String>) -> String {
    let if_else_re = Regex::new(r"(?s)\{if:(\w+)\}(.*?)\{else\}(.*?)\{/if\}").unwrap();
    let text = if_else_re.replace_all(text, |caps: &regex::Captures| {
        if is_truthy(vars, &caps[1]) {
            caps[2].to_string()
        } else {
            caps[3].to_string()
        }
    });

    let if_re = Regex::new(r"(?s)\{if:(\w+)\}(.*?)\{/if\}").unwrap();
    let text = if_re.replace_all(&text, |caps: &regex::Captures| {
        if is_truthy(vars, &caps[1]) {
            caps[2].to_string()
        } else {
            String::new()
        }
    });

    let ifnot_re = Regex::new(r"(?s)\{ifnot:(\w+)\}(.*?)\{/ifnot\}").unwrap();
    let text = ifnot_re.replace_all(&text, |caps: &regex::Captures| {
        if !is_truthy(vars, &caps[1]) {
            caps[2].to_string()
        } else {
            String::new()
        }
    });

    text.into_owned()
}

fn process_fallbacks(text: &str, vars: &HashMap<String, String>) -> String {
    let fallback_re = Regex::new(r"\{\{([A-Za-z0-9_.]+)\|([^{}]*)\}\}").unwrap();
    fallback_re
        .replace_all(text, |caps: &regex::Captures| {
            let var = &caps[1];
            let fallback = &caps[2];
            match resolve(vars, var) {
                Some(v) if !v.trim().is_empty() => v.to_string(),
                _ => fallback.to_string(),
            }
        })
        .into_owned()
}

fn process_spintax(text: &str, selector: &SpintaxSelector) -> String {
    let spintax_re = Regex::new(r"(?s)\{([^{}]+)\}").unwrap();
    spintax_re
        .replace_all(text, |caps: &regex::Captures| {
            let options: Vec<&str> = caps[1].split('|').collect();
            if options.len() <= 1 {
                caps[0].to_string()
            } else {
                let idx = selector.pick(options.len());
                options[idx].to_string()
            }
        })
        .into_owned()
}

fn process_plain_vars(text: &str, vars: &HashMap<String, String>) -> String {
    let plain_var_re = Regex::new(r"\{\{([A-Za-z0-9_.]+)\}\}").unwrap();
    plain_var_re
        .replace_all(text, |caps: &regex::Captures| {
            resolve(vars, &caps[1]).unwrap_or("").to_string()
        })
        .into_owned()
}

/// Production render: random spintax selection.
pub fn render(text: &str, vars: &HashMap<String, String>) -> String {
    render_with_selector(text, vars, &SpintaxSelector::Random)
}

/// Deterministic render for previews and tests (spec §9 "variation index").
pub fn render_preview(text: &str, vars: &HashMap<String, String>, variation_index: usize) -> String {
    render_with_selector(text, vars, &SpintaxSelector::Deterministic(variation_index))
}

fn render_with_selector(text: &str, vars: &HashMap<String, String>, selector: &SpintaxSelector) -> String {
    let text = process_conditionals(text, vars);
    let text = process_fallbacks(&text, vars);
    let text = process_spintax(&text, selector);
    process_plain_vars(&text, vars)
}

/// A rendered body must never reach the queue still carrying a smart
/// placeholder (spec §4.1, §9, P10).
pub fn contains_smart_placeholder(text: &str) -> bool {
    Regex::new(r"\[[^\[\]]+\]").unwrap().is_match(text)
}

/// Spec P10: nothing leaving the queue may still contain template syntax.
pub fn contains_unresolved_markup(text: &str) -> bool {
    text.contains("{{")
        || text.contains("{if:")
        || text.contains("{ifnot:")
        || text.contains("{/if}")
        || text.contains("{/ifnot}")
        || contains_smart_placeholder(text)
}

/// Detect and rewrite hardcoded greeting names in AI-generated content
/// (spec §4.1 "Variable hygiene"). Returns the fixed text and any warnings.
pub fn validate_and_fix_variables(text: &str) -> (String, Vec<String>) {
    let greeting_re = Regex::new(r"(Hi|Hello|Hey|Dear|Mr\.|Ms\.|Mrs\.)\s+([A-Z][a-zA-Z]*)([,.]?)").unwrap();
    let mut warnings = Vec::new();
    let fixed = greeting_re
        .replace_all(text, |caps: &regex::Captures| {
            warnings.push(format!(
                "hardcoded greeting name replaced: \"{}\" -> \"{} {{{{firstName}}}}{}\"",
                &caps[0], &caps[1], &caps[3]
            ));
            format!("{} {{{{firstName}}}}{}", &caps[1], &caps[3])
        })
        .into_owned();
    (fixed, warnings)
}

/// Builder assembling the flat `Map<String, String>` the template engine
/// consumes, from a lead's fields, an inbox's sender identity, and the
/// lead's custom fields, keyed in both naming conventions (spec §4.1, §9).
#[derive(Default)]
pub struct VariableBuilder {
    vars: HashMap<String, String>,
}

impl VariableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: impl Into<Option<String>>) -> Self {
        let value = value.into().unwrap_or_default();
        self.vars.insert(to_camel_case(key), value.clone());
        self.vars.insert(to_snake_case(key), value);
        self
    }

    pub fn set_custom_fields(mut self, custom_fields: &serde_json::Value) -> Self {
        if let Some(map) = custom_fields.as_object() {
            for (k, v) in map {
                let value = match v {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                };
                self.vars.insert(format!("custom_fields.{}", to_camel_case(k)), value.clone());
                self.vars.insert(format!("custom_fields.{}", to_snake_case(k)), value);
            }
        }
        self
    }

    pub fn build(self) -> HashMap<String, String> {
        self.vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn fallback_uses_value_when_present() {
        let v = vars(&[("firstName", "Jo")]);
        assert_eq!(render("Hi {{firstName|there}}", &v), "Hi Jo");
    }

    #[test]
    fn fallback_uses_default_when_missing() {
        let v = vars(&[]);
        assert_eq!(render("Hi {{firstName|there}}", &v), "Hi there");
    }

    #[test]
    fn conditional_if_else() {
        let v = vars(&[("company", "Acme")]);
        let t = "{if:company}at {{company}}{else}there{/if}";
        assert_eq!(render(t, &v), "at Acme");
        let v2 = vars(&[]);
        assert_eq!(render(t, &v2), "there");
    }

    #[test]
    fn conditional_ifnot() {
        let v = vars(&[]);
        let t = "{ifnot:company}no company on file{/ifnot}";
        assert_eq!(render(t, &v), "no company on file");
    }

    #[test]
    fn spintax_deterministic_by_index() {
        let v = vars(&[]);
        assert_eq!(render_preview("{hi|hello|hey}", &v, 0), "hi");
        assert_eq!(render_preview("{hi|hello|hey}", &v, 1), "hello");
        assert_eq!(render_preview("{hi|hello|hey}", &v, 2), "hey");
    }

    #[test]
    fn spintax_composes_independently() {
        let v = vars(&[]);
        let t = "{a|b} and {c|d}";
        assert_eq!(render_preview(t, &v, 0), "a and c");
        assert_eq!(render_preview(t, &v, 1), "b and d");
    }

    #[test]
    fn plain_variable_substitution() {
        let v = vars(&[("lastName", "Smith")]);
        assert_eq!(render("Hi {{lastName}}", &v), "Hi Smith");
        assert_eq!(render("Hi {{missingVar}}", &v), "Hi ");
    }

    #[test]
    fn snake_and_camel_case_both_resolve() {
        let v = vars(&[("first_name", "Jo")]);
        assert_eq!(render("{{firstName}}", &v), "Jo");

        let v2 = vars(&[("firstName", "Jo")]);
        assert_eq!(render("{{first_name}}", &v2), "Jo");
    }

    #[test]
    fn smart_placeholder_is_left_untouched() {
        let v = vars(&[("firstName", "Jo")]);
        let t = "Hi {{firstName}}, [mention their recent funding round]";
        let out = render(t, &v);
        assert_eq!(out, "Hi Jo, [mention their recent funding round]");
        assert!(contains_smart_placeholder(&out));
    }

    #[test]
    fn p1_idempotent_without_conditionals_spintax_or_placeholders() {
        let v = vars(&[("firstName", "Jo"), ("company", "Acme")]);
        let t = "Hi {{firstName|there}}, from {{company}}";
        let once = render(t, &v);
        let twice = render(&once, &v);
        assert_eq!(once, twice);
    }

    #[test]
    fn p10_rendered_output_purity() {
        let v = vars(&[("firstName", "Jo")]);
        let t = "{if:company}Hi {{firstName}} at {{company}}{else}Hi {{firstName|there}}{/if}";
        let out = render(t, &v);
        assert!(!contains_unresolved_markup(&out));
    }

    #[test]
    fn greeting_hygiene_rewrites_hardcoded_names() {
        let (fixed, warnings) = validate_and_fix_variables("Hi John, quick question");
        assert_eq!(fixed, "Hi {{firstName}}, quick question");
        assert_eq!(warnings.len(), 1);
    }
}
