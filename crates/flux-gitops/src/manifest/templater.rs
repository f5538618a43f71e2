//! Embedded manifest templates rendered with minijinja.

use minijinja::{Environment, UndefinedBehavior, Value};

use crate::error::ManifestError;

pub const EKSA_KUSTOMIZATION: &str = "eksa-kustomization.yaml";
pub const FLUX_KUSTOMIZATION: &str = "flux-kustomization.yaml";
pub const FLUX_SYNC: &str = "gotk-sync.yaml";
pub const FLUX_PATCHES: &str = "gotk-patches.yaml";

const TEMPLATES: &[(&str, &str)] = &[
    (
        EKSA_KUSTOMIZATION,
        include_str!("templates/eksa-kustomization.yaml"),
    ),
    (
        FLUX_KUSTOMIZATION,
        include_str!("templates/flux-kustomization.yaml"),
    ),
    (FLUX_SYNC, include_str!("templates/gotk-sync.yaml")),
    (FLUX_PATCHES, include_str!("templates/gotk-patches.yaml")),
];

/// Renders the embedded manifest templates.
///
/// Undefined variables are errors so a missing value never produces an empty field.
pub struct Templater {
    env: Environment<'static>,
}

impl Templater {
    pub fn new() -> Result<Self, ManifestError> {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        env.set_undefined_behavior(UndefinedBehavior::Strict);

        for &(name, source) in TEMPLATES {
            env.add_template(name, source)
                .map_err(|e| ManifestError::Render {
                    template: name.to_string(),
                    reason: e.to_string(),
                })?;
        }

        Ok(Self { env })
    }

    /// Renders a named template with `ctx`.
    pub fn render(&self, template: &str, ctx: Value) -> Result<String, ManifestError> {
        let tmpl = self
            .env
            .get_template(template)
            .map_err(|e| ManifestError::Render {
                template: template.to_string(),
                reason: e.to_string(),
            })?;

        tmpl.render(ctx).map_err(|e| ManifestError::Render {
            template: template.to_string(),
            reason: e.to_string(),
        })
    }
}

impl std::fmt::Debug for Templater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Templater").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn test_render_flux_kustomization() {
        let templater = Templater::new().unwrap();
        let out = templater
            .render(FLUX_KUSTOMIZATION, context! { namespace => "gitops" })
            .unwrap();
        assert!(out.contains("namespace: gitops"));
        assert!(out.ends_with("gotk-patches.yaml\n"));
    }

    #[test]
    fn test_missing_value_is_an_error() {
        let templater = Templater::new().unwrap();
        let err = templater
            .render(FLUX_PATCHES, context! { namespace => "flux-system" })
            .unwrap_err();
        assert!(matches!(err, ManifestError::Render { .. }));
    }

    #[test]
    fn test_unknown_template() {
        let templater = Templater::new().unwrap();
        assert!(templater.render("nope.yaml", context! {}).is_err());
    }

    #[test]
    fn test_sync_template_needs_no_values() {
        let templater = Templater::new().unwrap();
        let out = templater.render(FLUX_SYNC, context! {}).unwrap();
        assert!(out.starts_with('#'));
    }
}
