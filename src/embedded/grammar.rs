use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tree_sitter::Query;

use crate::analysis::SubLanguage;

pub trait EmbeddedGrammar: Send + Sync {
    fn sub_language(&self) -> SubLanguage;
    fn name(&self) -> &'static str;
    fn language(&self) -> tree_sitter::Language;

    /// Captures `@name` and `@function`, optionally `@params`.
    fn functions_query(&self) -> &str;

    /// Node kinds that carry a symbol name.
    fn identifier_kinds(&self) -> &[&'static str];

    fn keywords(&self) -> &[&'static str] {
        &[]
    }

    /// Get cached functions query (compiled once)
    fn cached_functions_query(&self) -> Option<&'static Query> {
        None
    }
}

static SHELL_FUNCTIONS_QUERY: OnceCell<Query> = OnceCell::new();
static PYTHON_FUNCTIONS_QUERY: OnceCell<Query> = OnceCell::new();

pub struct ShellGrammar;

impl EmbeddedGrammar for ShellGrammar {
    fn sub_language(&self) -> SubLanguage {
        SubLanguage::Shell
    }

    fn name(&self) -> &'static str {
        "bash"
    }

    fn language(&self) -> tree_sitter::Language {
        tree_sitter_bash::LANGUAGE.into()
    }

    fn functions_query(&self) -> &str {
        r#"
        (function_definition
            name: (word) @name
        ) @function
        "#
    }

    fn identifier_kinds(&self) -> &[&'static str] {
        &["word", "variable_name"]
    }

    fn keywords(&self) -> &[&'static str] {
        &[
            "case", "do", "done", "elif", "else", "esac", "export", "fi", "for", "if", "in",
            "local", "return", "then", "while",
        ]
    }

    fn cached_functions_query(&self) -> Option<&'static Query> {
        SHELL_FUNCTIONS_QUERY
            .get_or_try_init(|| Query::new(&self.language(), self.functions_query()))
            .ok()
    }
}

pub struct PythonGrammar;

impl EmbeddedGrammar for PythonGrammar {
    fn sub_language(&self) -> SubLanguage {
        SubLanguage::Dynamic
    }

    fn name(&self) -> &'static str {
        "python"
    }

    fn language(&self) -> tree_sitter::Language {
        tree_sitter_python::LANGUAGE.into()
    }

    fn functions_query(&self) -> &str {
        r#"
        (function_definition
            name: (identifier) @name
            parameters: (parameters) @params
        ) @function
        "#
    }

    fn identifier_kinds(&self) -> &[&'static str] {
        &["identifier"]
    }

    fn keywords(&self) -> &[&'static str] {
        &[
            "and", "def", "elif", "else", "except", "for", "from", "if", "import", "in", "is",
            "not", "or", "pass", "return", "try", "while", "with", "yield",
        ]
    }

    fn cached_functions_query(&self) -> Option<&'static Query> {
        PYTHON_FUNCTIONS_QUERY
            .get_or_try_init(|| Query::new(&self.language(), self.functions_query()))
            .ok()
    }
}

pub struct GrammarRegistry {
    grammars: HashMap<SubLanguage, Arc<dyn EmbeddedGrammar>>,
}

impl GrammarRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            grammars: HashMap::new(),
        };
        registry.register(Arc::new(ShellGrammar));
        registry.register(Arc::new(PythonGrammar));
        registry
    }

    pub fn register(&mut self, grammar: Arc<dyn EmbeddedGrammar>) {
        self.grammars.insert(grammar.sub_language(), grammar);
    }

    pub fn get(&self, language: SubLanguage) -> Option<Arc<dyn EmbeddedGrammar>> {
        self.grammars.get(&language).cloned()
    }
}

impl Default for GrammarRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_both_languages() {
        let registry = GrammarRegistry::new();
        assert_eq!(registry.get(SubLanguage::Shell).unwrap().name(), "bash");
        assert_eq!(registry.get(SubLanguage::Dynamic).unwrap().name(), "python");
    }

    #[test]
    fn test_function_queries_compile() {
        assert!(ShellGrammar.cached_functions_query().is_some());
        assert!(PythonGrammar.cached_functions_query().is_some());
    }
}
