use anyhow::{anyhow, bail};
use itertools::Itertools;

use crate::utils::{tokens, Res};

#[derive(Debug, Clone, Default)]
pub struct UsiCheck {
    pub val: Option<bool>,
    pub default: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct UsiSpin {
    pub val: Option<i64>,
    pub default: Option<i64>,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct UsiCombo {
    pub val: Option<String>,
    pub default: Option<String>,
    pub choices: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UsiString {
    pub val: Option<String>,
    pub default: Option<String>,
}

#[derive(Debug, Clone)]
pub enum OptionValue {
    Check(UsiCheck),
    Spin(UsiSpin),
    Combo(UsiCombo),
    Button,
    Str(UsiString),
}

impl OptionValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            OptionValue::Check(_) => "check",
            OptionValue::Spin(_) => "spin",
            OptionValue::Combo(_) => "combo",
            OptionValue::Button => "button",
            OptionValue::Str(_) => "string",
        }
    }
}

/// One option as declared by the engine during the handshake, together with
/// the value the arbiter last set.
#[derive(Debug, Clone)]
pub struct EngineOption {
    pub name: String,
    pub value: OptionValue,
}

impl EngineOption {
    /// Parses a declaration of the form
    /// `option name <N…> type <T> [default D] [min X] [max Y] [var V]*`.
    /// Option names may span several tokens (`Clear Hash`).
    pub fn parse(line: &str) -> Res<Self> {
        let mut words = tokens(line);
        match words.next() {
            Some("option") => {}
            other => bail!("Expected an 'option' declaration, got '{}'", other.unwrap_or("")),
        }
        if words.next() != Some("name") {
            bail!("Expected 'name' after 'option' in '{line}'");
        }
        let name_words = words
            .take_while_ref(|word| *word != "type")
            .collect::<Vec<_>>();
        let name = name_words.join(" ");
        if name.is_empty() {
            bail!("Missing option name in '{line}'");
        }
        if words.next() != Some("type") {
            bail!("Missing 'type' for option '{name}'");
        }
        let typ = words
            .next()
            .ok_or_else(|| anyhow!("Missing option type for '{name}'"))?;
        let mut value = match typ {
            "check" => OptionValue::Check(UsiCheck::default()),
            "spin" => OptionValue::Spin(UsiSpin::default()),
            "combo" => OptionValue::Combo(UsiCombo::default()),
            "button" => OptionValue::Button,
            "string" => OptionValue::Str(UsiString::default()),
            x => bail!("Unrecognized type '{x}' for option '{name}'"),
        };
        while let Some(setting) = words.next() {
            let Some(word) = words.next() else {
                bail!("Missing value after '{setting}' for option '{name}'")
            };
            match (setting, &mut value) {
                ("default", OptionValue::Check(c)) => {
                    c.default = Some(word.eq_ignore_ascii_case("true"));
                }
                ("default", OptionValue::Spin(s)) => {
                    s.default = Some(word.parse()?);
                }
                ("default", OptionValue::Combo(c)) => c.default = Some(word.to_string()),
                ("default", OptionValue::Str(s)) => {
                    s.default = Some(if word == "<empty>" { String::new() } else { word.to_string() });
                }
                ("min", OptionValue::Spin(s)) => s.min = Some(word.parse()?),
                ("max", OptionValue::Spin(s)) => s.max = Some(word.parse()?),
                ("var", OptionValue::Combo(c)) => c.choices.push(word.to_string()),
                _ => bail!(
                    "Option '{name}' of type '{}' can't have a '{setting}' parameter",
                    value.type_name()
                ),
            }
        }
        Ok(Self { name, value })
    }

    pub fn is_valid(&self, value: &str) -> bool {
        match &self.value {
            OptionValue::Check(_) => value == "true" || value == "false",
            OptionValue::Spin(spin) => match value.parse::<i64>() {
                Err(_) => false,
                Ok(n) => {
                    spin.min.is_none_or(|min| n >= min) && spin.max.is_none_or(|max| n <= max)
                }
            },
            OptionValue::Combo(combo) => combo.choices.iter().any(|choice| choice == value),
            // a button carries no value; "true" triggers it
            OptionValue::Button => value == "true",
            OptionValue::Str(_) => true,
        }
    }

    /// Stores `value` if it is valid for this option's domain.
    pub fn set_value(&mut self, value: &str) -> bool {
        if !self.is_valid(value) {
            return false;
        }
        match &mut self.value {
            OptionValue::Check(c) => c.val = Some(value == "true"),
            OptionValue::Spin(s) => s.val = value.parse().ok(),
            OptionValue::Combo(c) => c.val = Some(value.to_string()),
            OptionValue::Button => {}
            OptionValue::Str(s) => s.val = Some(value.to_string()),
        }
        true
    }

    /// The current value, falling back to the declared default.
    pub fn get_value(&self) -> Option<String> {
        match &self.value {
            OptionValue::Check(c) => c.val.or(c.default).map(|b| b.to_string()),
            OptionValue::Spin(s) => s.val.or(s.default).map(|n| n.to_string()),
            OptionValue::Combo(c) => c.val.clone().or_else(|| c.default.clone()),
            OptionValue::Button => None,
            OptionValue::Str(s) => s.val.clone().or_else(|| s.default.clone()),
        }
    }
}

/// The options one engine declared, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct OptionRegistry {
    options: Vec<EngineOption>,
}

impl OptionRegistry {
    pub fn add(&mut self, option: EngineOption) {
        self.options.push(option);
    }

    pub fn get(&self, name: &str) -> Option<&EngineOption> {
        self.options.iter().find(|option| option.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut EngineOption> {
        self.options.iter_mut().find(|option| option.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EngineOption> {
        self.options.iter()
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spin_round_trip() {
        let mut option =
            EngineOption::parse("option name X type spin default 10 min 1 max 100").unwrap();
        assert_eq!(option.name, "X");
        assert_eq!(option.get_value().as_deref(), Some("10"));
        assert!(option.set_value("50"));
        assert_eq!(option.get_value().as_deref(), Some("50"));
        assert!(!option.is_valid("200"));
        assert!(!option.set_value("200"));
        assert_eq!(option.get_value().as_deref(), Some("50"));
        assert!(!option.is_valid("0"));
        assert!(!option.is_valid("ten"));
    }

    #[test]
    fn check_and_button() {
        let check = EngineOption::parse("option name Ponder type check default false").unwrap();
        assert!(check.is_valid("true"));
        assert!(check.is_valid("false"));
        assert!(!check.is_valid("on"));
        assert_eq!(check.get_value().as_deref(), Some("false"));

        let button = EngineOption::parse("option name Clear Hash type button").unwrap();
        assert_eq!(button.name, "Clear Hash");
        assert!(button.is_valid("true"));
        assert!(!button.is_valid("false"));
        assert_eq!(button.get_value(), None);
    }

    #[test]
    fn combo_choices() {
        let mut combo = EngineOption::parse(
            "option name Style type combo default Normal var Solid var Normal var Risky",
        )
        .unwrap();
        assert!(combo.is_valid("Risky"));
        assert!(!combo.is_valid("Aggressive"));
        assert!(combo.set_value("Solid"));
        assert_eq!(combo.get_value().as_deref(), Some("Solid"));
    }

    #[test]
    fn string_accepts_anything() {
        let mut opt =
            EngineOption::parse("option name SyzygyPath type string default <empty>").unwrap();
        assert_eq!(opt.get_value().as_deref(), Some(""));
        assert!(opt.set_value("/tmp/tb"));
        assert_eq!(opt.get_value().as_deref(), Some("/tmp/tb"));
    }

    #[test]
    fn unbounded_spin() {
        let spin = EngineOption::parse("option name Slack type spin").unwrap();
        assert!(spin.is_valid("-100000"));
        assert!(spin.is_valid("100000"));
    }

    #[test]
    fn malformed_declarations() {
        assert!(EngineOption::parse("option name X type knob").is_err());
        assert!(EngineOption::parse("option X type spin").is_err());
        assert!(EngineOption::parse("option name type spin").is_err());
        assert!(EngineOption::parse("option name X type spin default").is_err());
        assert!(EngineOption::parse("option name X type check min 3").is_err());
    }

    #[test]
    fn registry_lookup_is_case_sensitive() {
        let mut registry = OptionRegistry::default();
        registry.add(EngineOption::parse("option name Threads type spin default 1 min 1 max 1024").unwrap());
        assert!(registry.get("Threads").is_some());
        assert!(registry.get("threads").is_none());
        assert_eq!(registry.len(), 1);
    }
}
