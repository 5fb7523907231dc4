//! Template rendering seam.

use minijinja::Environment;

use crate::render::context::RenderContext;
use crate::render::RenderError;

/// Turns template source plus context into proxy configuration text.
pub trait TemplateEngine: Send + Sync {
    fn render(&self, template: &str, context: &RenderContext) -> Result<String, RenderError>;
}

/// Jinja-syntax templates. Python-style methods such as `.items()` and
/// `.values()` are available on maps, strings and lists.
pub struct JinjaEngine {
    env: Environment<'static>,
}

impl JinjaEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        env.set_unknown_method_callback(minijinja_contrib::pycompat::unknown_method_callback);
        Self { env }
    }
}

impl Default for JinjaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine for JinjaEngine {
    fn render(&self, template: &str, context: &RenderContext) -> Result<String, RenderError> {
        self.env
            .render_str(template, context)
            .map_err(|e| RenderError::Template(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::context::StatsCredentials;
    use crate::snapshot::SnapshotStore;
    use std::collections::BTreeMap;

    fn context_with_env(env: BTreeMap<String, String>) -> RenderContext {
        let store = SnapshotStore::new();
        store
            .set_services_config(&BTreeMap::from([
                ("b".to_string(), r#"{"namespace":"ns","selector":{}}"#.to_string()),
                ("a".to_string(), r#"{"namespace":"ns","selector":{}}"#.to_string()),
            ]))
            .unwrap();
        RenderContext::build(
            &store.read_snapshot(),
            StatsCredentials { username: "stats".into(), password: Some("pw".into()) },
            vec!["foo".into()],
            "/srv/ssl".into(),
            env,
        )
    }

    fn context() -> RenderContext {
        context_with_env(BTreeMap::new())
    }

    #[test]
    fn test_renders_context() {
        let template = "listen stats\n  stats auth {{ stats.username }}:{{ stats.password }}\n\
            {% for s in services %}backend {{ s.name }}\n{% endfor %}\
            {% for c in certificates %}crt {{ ssldir }}/{{ c }}.pem\n{% endfor %}";
        let out = JinjaEngine::new().render(template, &context()).unwrap();
        assert_eq!(
            out,
            "listen stats\n  stats auth stats:pw\nbackend a\nbackend b\ncrt /srv/ssl/foo.pem\n"
        );
    }

    #[test]
    fn test_python_style_methods() {
        let env = BTreeMap::from([
            ("REGION".to_string(), "eu".to_string()),
            ("ZONE".to_string(), "b".to_string()),
        ]);
        let template = "{% for k, v in env.items() %}{{ k }}={{ v }};{% endfor %}\
            {{ env.values()|join(',') }};{{ env.get('MISSING', 'none') }};\
            {% for s in services %}{% for n, p in s.pods.items() %}{{ n }}{% endfor %}{{ s.name }}{% endfor %};{{ ssldir.upper() }}";
        let out = JinjaEngine::new().render(template, &context_with_env(env)).unwrap();
        assert_eq!(out, "REGION=eu;ZONE=b;eu,b;none;ab;/SRV/SSL");
    }

    #[test]
    fn test_syntax_error_reported() {
        let err = JinjaEngine::new().render("{% for %}", &context()).unwrap_err();
        assert!(matches!(err, RenderError::Template(_)));
    }
}
