use crate::error::RuleError;
use cadmon_common::types::AlarmState;
use std::collections::{BTreeSet, HashMap};

/// Boolean rule tree over named alarms.
///
/// Reduction is three-valued with `ALARM` as true, `OK` as false and
/// `INSUFFICIENT_DATA` as unknown, so a composite only claims a definite
/// verdict when the leaf states force one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositeRule {
    /// Leaf: the current state of a named alarm.
    Alarm(String),
    AnyOf(Vec<CompositeRule>),
    AllOf(Vec<CompositeRule>),
    Not(Box<CompositeRule>),
}

impl CompositeRule {
    /// Names of all alarms referenced by the tree.
    pub fn alarm_names(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.collect_alarm_names(&mut names);
        names
    }

    fn collect_alarm_names<'a>(&'a self, names: &mut BTreeSet<&'a str>) {
        match self {
            CompositeRule::Alarm(name) => {
                names.insert(name.as_str());
            }
            CompositeRule::AnyOf(children) | CompositeRule::AllOf(children) => {
                for child in children {
                    child.collect_alarm_names(names);
                }
            }
            CompositeRule::Not(child) => child.collect_alarm_names(names),
        }
    }

    /// Fails if the tree references an alarm that is not configured.
    pub fn validate(&self, known: &BTreeSet<String>) -> Result<(), RuleError> {
        for name in self.alarm_names() {
            if !known.contains(name) {
                return Err(RuleError::UnknownAlarm(name.to_string()));
            }
        }
        Ok(())
    }

    /// Pure reduction over a snapshot of leaf states. An unknown leaf
    /// reduces to `INSUFFICIENT_DATA`; load-time validation makes that
    /// unreachable in practice.
    pub fn reduce(&self, states: &HashMap<String, AlarmState>) -> AlarmState {
        match self {
            CompositeRule::Alarm(name) => states
                .get(name)
                .copied()
                .unwrap_or(AlarmState::InsufficientData),
            CompositeRule::AnyOf(children) => {
                let mut any_unknown = false;
                for child in children {
                    match child.reduce(states) {
                        AlarmState::Alarm => return AlarmState::Alarm,
                        AlarmState::InsufficientData => any_unknown = true,
                        AlarmState::Ok => {}
                    }
                }
                if any_unknown {
                    AlarmState::InsufficientData
                } else {
                    AlarmState::Ok
                }
            }
            CompositeRule::AllOf(children) => {
                let mut any_unknown = false;
                for child in children {
                    match child.reduce(states) {
                        AlarmState::Ok => return AlarmState::Ok,
                        AlarmState::InsufficientData => any_unknown = true,
                        AlarmState::Alarm => {}
                    }
                }
                if any_unknown {
                    AlarmState::InsufficientData
                } else {
                    AlarmState::Alarm
                }
            }
            CompositeRule::Not(child) => match child.reduce(states) {
                AlarmState::Alarm => AlarmState::Ok,
                AlarmState::Ok => AlarmState::Alarm,
                AlarmState::InsufficientData => AlarmState::InsufficientData,
            },
        }
    }
}

/// Parses the textual rule form, e.g. `under_invoked OR over_invoked`
/// or `NOT (a AND b)`. Keywords are case-insensitive; precedence is
/// `NOT` over `AND` over `OR`.
pub fn parse_rule(input: &str) -> Result<CompositeRule, RuleError> {
    let tokens = lex_rule(input)?;
    let mut parser = RuleParser { tokens, pos: 0 };
    let rule = parser.or_expr()?;
    match parser.peek() {
        Some((pos, tok)) => Err(RuleError::Parse {
            pos: *pos,
            message: format!("unexpected trailing {tok}"),
        }),
        None => Ok(rule),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum RuleToken {
    Ident(String),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

impl std::fmt::Display for RuleToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleToken::Ident(s) => write!(f, "identifier '{s}'"),
            RuleToken::And => write!(f, "'AND'"),
            RuleToken::Or => write!(f, "'OR'"),
            RuleToken::Not => write!(f, "'NOT'"),
            RuleToken::LParen => write!(f, "'('"),
            RuleToken::RParen => write!(f, "')'"),
        }
    }
}

fn lex_rule(input: &str) -> Result<Vec<(usize, RuleToken)>, RuleError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push((i, RuleToken::LParen));
                i += 1;
            }
            ')' => {
                tokens.push((i, RuleToken::RParen));
                i += 1;
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric()
                        || bytes[i] == b'_'
                        || bytes[i] == b'-'
                        || bytes[i] == b'.')
                {
                    i += 1;
                }
                let word = &input[start..i];
                let token = match word.to_ascii_uppercase().as_str() {
                    "AND" => RuleToken::And,
                    "OR" => RuleToken::Or,
                    "NOT" => RuleToken::Not,
                    _ => RuleToken::Ident(word.to_string()),
                };
                tokens.push((start, token));
            }
            other => {
                return Err(RuleError::Parse {
                    pos: i,
                    message: format!("unexpected character '{other}'"),
                });
            }
        }
    }

    Ok(tokens)
}

struct RuleParser {
    tokens: Vec<(usize, RuleToken)>,
    pos: usize,
}

impl RuleParser {
    fn peek(&self) -> Option<&(usize, RuleToken)> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<(usize, RuleToken)> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn end_pos(&self) -> usize {
        self.tokens.last().map(|(p, _)| p + 1).unwrap_or(0)
    }

    fn or_expr(&mut self) -> Result<CompositeRule, RuleError> {
        let mut children = vec![self.and_expr()?];
        while matches!(self.peek(), Some((_, RuleToken::Or))) {
            self.next();
            children.push(self.and_expr()?);
        }
        Ok(if children.len() == 1 {
            children.pop().unwrap()
        } else {
            CompositeRule::AnyOf(children)
        })
    }

    fn and_expr(&mut self) -> Result<CompositeRule, RuleError> {
        let mut children = vec![self.not_expr()?];
        while matches!(self.peek(), Some((_, RuleToken::And))) {
            self.next();
            children.push(self.not_expr()?);
        }
        Ok(if children.len() == 1 {
            children.pop().unwrap()
        } else {
            CompositeRule::AllOf(children)
        })
    }

    fn not_expr(&mut self) -> Result<CompositeRule, RuleError> {
        if matches!(self.peek(), Some((_, RuleToken::Not))) {
            self.next();
            let inner = self.not_expr()?;
            return Ok(CompositeRule::Not(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<CompositeRule, RuleError> {
        match self.next() {
            Some((_, RuleToken::Ident(name))) => Ok(CompositeRule::Alarm(name)),
            Some((_, RuleToken::LParen)) => {
                let inner = self.or_expr()?;
                match self.next() {
                    Some((_, RuleToken::RParen)) => Ok(inner),
                    Some((pos, tok)) => Err(RuleError::Parse {
                        pos,
                        message: format!("expected ')', found {tok}"),
                    }),
                    None => Err(RuleError::Parse {
                        pos: self.end_pos(),
                        message: "expected ')', found end of input".to_string(),
                    }),
                }
            }
            Some((pos, tok)) => Err(RuleError::Parse {
                pos,
                message: format!("expected an alarm name, found {tok}"),
            }),
            None => Err(RuleError::Parse {
                pos: self.end_pos(),
                message: "expected an alarm name, found end of input".to_string(),
            }),
        }
    }
}
