use minijinja::{context, Environment};
use tracing::error;

pub fn init_templates() -> Environment<'static> {
    let mut env = Environment::new();

    // Register built-in templates
    env.add_template("index.html", include_str!("../../templates/index.html"))
        .expect("Failed to add index template");
    env.add_template("error.html", include_str!("../../templates/error.html"))
        .expect("Failed to add error template");

    env
}

pub fn render_template(env: &Environment, template_name: &str, ctx: minijinja::value::Value) -> String {
    match env.get_template(template_name) {
        Ok(tmpl) => match tmpl.render(ctx) {
            Ok(result) => result,
            Err(e) => {
                error!("Template render error: {}", e);
                render_error(env, &e.to_string())
            }
        },
        Err(e) => {
            error!("Template not found: {} ({})", template_name, e);
            render_error(env, &format!("{}: {}", template_name, e))
        }
    }
}

fn render_error(env: &Environment, message: &str) -> String {
    env.get_template("error.html")
        .and_then(|tmpl| tmpl.render(context! { message => message }))
        .unwrap_or_else(|_| format!("<h1>Template Error</h1><p>{}</p>", message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_renders_providers_and_schema() {
        let env = init_templates();
        let html = render_template(
            &env,
            "index.html",
            context! {
                version => "0.1.0",
                default_provider => "groq",
                default_mode => "sql_only",
                providers => vec![context! { name => "groq", models => vec!["llama3-8b-8192"] }],
                default_schema => "CREATE TABLE jobs (job_role VARCHAR);",
            },
        );

        assert!(html.contains("llama3-8b-8192"));
        assert!(html.contains("CREATE TABLE jobs (job_role VARCHAR);"));
    }

    #[test]
    fn missing_template_falls_back_to_error_page() {
        let env = init_templates();
        let html = render_template(&env, "nope.html", context! {});
        assert!(html.contains("nope.html"));
    }
}
