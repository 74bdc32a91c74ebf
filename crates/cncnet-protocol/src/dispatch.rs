//! Keyword dispatch tables for in-band control messages.
//!
//! Both the CTCP layer and the LAN protocol decode "KEYWORD[sep]parameter"
//! commands addressed to the local peer. A [`CommandTable`] holds handlers in
//! registration order; the first one whose shape matches the message wins.
//!
//! | shape        | matches when                                         |
//! |--------------|------------------------------------------------------|
//! | no-param     | message equals the keyword                           |
//! | int-param    | message starts with `keyword + sep`, rest is an `i32`|
//! | string-param | message starts with `keyword + sep` (any case)       |
//!
//! Messages that match nothing are logged and dropped.

type NoParamFn<C> = Box<dyn Fn(&mut C, &str) + Send + Sync>;
type IntParamFn<C> = Box<dyn Fn(&mut C, &str, i32) + Send + Sync>;
type StringParamFn<C> = Box<dyn Fn(&mut C, &str, &str) + Send + Sync>;

enum Handler<C> {
    NoParam(NoParamFn<C>),
    IntParam(IntParamFn<C>),
    StringParam(StringParamFn<C>),
}

struct Entry<C> {
    keyword: String,
    handler: Handler<C>,
}

/// Ordered table of command handlers invoked against a context `C`.
pub struct CommandTable<C> {
    separator: char,
    entries: Vec<Entry<C>>,
}

impl<C> CommandTable<C> {
    /// Create an empty table whose parameters follow `separator`.
    pub fn new(separator: char) -> Self {
        Self {
            separator,
            entries: Vec::new(),
        }
    }

    /// Register a handler for a bare keyword.
    pub fn no_param<F>(mut self, keyword: &str, handler: F) -> Self
    where
        F: Fn(&mut C, &str) + Send + Sync + 'static,
    {
        self.entries.push(Entry {
            keyword: keyword.to_string(),
            handler: Handler::NoParam(Box::new(handler)),
        });
        self
    }

    /// Register a handler for `keyword<sep><integer>`.
    pub fn int_param<F>(mut self, keyword: &str, handler: F) -> Self
    where
        F: Fn(&mut C, &str, i32) + Send + Sync + 'static,
    {
        self.entries.push(Entry {
            keyword: keyword.to_string(),
            handler: Handler::IntParam(Box::new(handler)),
        });
        self
    }

    /// Register a handler for `keyword<sep><anything>`.
    pub fn string_param<F>(mut self, keyword: &str, handler: F) -> Self
    where
        F: Fn(&mut C, &str, &str) + Send + Sync + 'static,
    {
        self.entries.push(Entry {
            keyword: keyword.to_string(),
            handler: Handler::StringParam(Box::new(handler)),
        });
        self
    }

    /// The parameter separator this table was built with.
    pub fn separator(&self) -> char {
        self.separator
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Try each handler in order and invoke the first match.
    ///
    /// Returns `false` when nothing matched; the message is logged as unknown.
    pub fn dispatch(&self, ctx: &mut C, sender: &str, message: &str) -> bool {
        for entry in &self.entries {
            match &entry.handler {
                Handler::NoParam(f) => {
                    if message == entry.keyword {
                        f(ctx, sender);
                        return true;
                    }
                }
                Handler::IntParam(f) => {
                    if let Some(rest) = self.strip_keyword(message, &entry.keyword, false)
                        && let Ok(value) = rest.parse::<i32>()
                    {
                        f(ctx, sender, value);
                        return true;
                    }
                }
                Handler::StringParam(f) => {
                    if let Some(rest) = self.strip_keyword(message, &entry.keyword, true) {
                        f(ctx, sender, rest);
                        return true;
                    }
                }
            }
        }

        tracing::debug!("Unknown command from {sender}: {message:?}");
        false
    }

    /// Return the text after `keyword<sep>` if `message` begins with it.
    fn strip_keyword<'m>(
        &self,
        message: &'m str,
        keyword: &str,
        ignore_case: bool,
    ) -> Option<&'m str> {
        let head = message.get(..keyword.len())?;
        let matches = if ignore_case {
            head.eq_ignore_ascii_case(keyword)
        } else {
            head == keyword
        };
        if !matches {
            return None;
        }
        message[keyword.len()..].strip_prefix(self.separator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Calls(Vec<String>);

    fn table() -> CommandTable<Calls> {
        CommandTable::new(' ')
            .no_param("GTRDY", |c: &mut Calls, s| c.0.push(format!("gtrdy:{s}")))
            .int_param("READY", |c: &mut Calls, s, v| c.0.push(format!("ready:{s}:{v}")))
            .string_param("OP", |c: &mut Calls, s, p| c.0.push(format!("op:{s}:{p}")))
    }

    #[test]
    fn test_no_param_exact_match() {
        let mut calls = Calls::default();
        assert!(table().dispatch(&mut calls, "Alice", "GTRDY"));
        assert_eq!(calls.0, vec!["gtrdy:Alice"]);
    }

    #[test]
    fn test_no_param_requires_exact_equality() {
        let mut calls = Calls::default();
        assert!(!table().dispatch(&mut calls, "Alice", "GTRDY now"));
        assert!(!table().dispatch(&mut calls, "Alice", "gtrdy"));
        assert!(calls.0.is_empty());
    }

    #[test]
    fn test_int_param_parses_value() {
        let mut calls = Calls::default();
        assert!(table().dispatch(&mut calls, "Bob", "READY 1"));
        assert!(table().dispatch(&mut calls, "Bob", "READY -3"));
        assert_eq!(calls.0, vec!["ready:Bob:1", "ready:Bob:-3"]);
    }

    #[test]
    fn test_int_param_unparsable_falls_through() {
        let mut calls = Calls::default();
        assert!(!table().dispatch(&mut calls, "Bob", "READY yes"));
        assert!(!table().dispatch(&mut calls, "Bob", "READY"));
        assert!(calls.0.is_empty());
    }

    #[test]
    fn test_int_param_falls_through_to_later_string_handler() {
        let table = CommandTable::new(' ')
            .int_param("TNLPNG", |c: &mut Calls, _, v| c.0.push(format!("int:{v}")))
            .string_param("TNLPNG", |c: &mut Calls, _, p| c.0.push(format!("str:{p}")));
        let mut calls = Calls::default();
        assert!(table.dispatch(&mut calls, "x", "TNLPNG fast"));
        assert_eq!(calls.0, vec!["str:fast"]);
    }

    #[test]
    fn test_string_param_is_case_insensitive() {
        let mut calls = Calls::default();
        assert!(table().dispatch(&mut calls, "Carol", "op 2;Alice:1"));
        assert_eq!(calls.0, vec!["op:Carol:2;Alice:1"]);
    }

    #[test]
    fn test_string_param_keeps_everything_after_first_separator() {
        let mut calls = Calls::default();
        assert!(table().dispatch(&mut calls, "Carol", "OP a b  c"));
        assert_eq!(calls.0, vec!["op:Carol:a b  c"]);
    }

    #[test]
    fn test_keyword_prefix_of_longer_word_does_not_match() {
        let mut calls = Calls::default();
        assert!(!table().dispatch(&mut calls, "Dan", "OPTIONS 1"));
        assert!(calls.0.is_empty());
    }

    #[test]
    fn test_first_registered_handler_wins() {
        let table = CommandTable::new(' ')
            .string_param("CHAT", |c: &mut Calls, _, _| c.0.push("first".into()))
            .string_param("CHAT", |c: &mut Calls, _, _| c.0.push("second".into()));
        let mut calls = Calls::default();
        table.dispatch(&mut calls, "x", "CHAT hi");
        assert_eq!(calls.0, vec!["first"]);
    }

    #[test]
    fn test_custom_separator() {
        let table = CommandTable::new('\u{1}')
            .string_param("FILE_HASH", |c: &mut Calls, s, p| c.0.push(format!("{s}={p}")));
        let mut calls = Calls::default();
        assert!(table.dispatch(&mut calls, "Eve", "FILE_HASH\u{1}abc123"));
        assert!(!table.dispatch(&mut calls, "Eve", "FILE_HASH abc123"));
        assert_eq!(calls.0, vec!["Eve=abc123"]);
    }

    #[test]
    fn test_unknown_command_returns_false() {
        let mut calls = Calls::default();
        assert!(!table().dispatch(&mut calls, "Zed", "WHATEVER"));
        assert!(!table().dispatch(&mut calls, "Zed", ""));
    }

    #[test]
    fn test_multibyte_message_does_not_panic() {
        let mut calls = Calls::default();
        assert!(!table().dispatch(&mut calls, "Zed", "Ö"));
        assert!(!table().dispatch(&mut calls, "Zed", "RÉADY 1"));
    }
}
