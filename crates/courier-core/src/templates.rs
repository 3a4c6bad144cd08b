//! Template selection, placeholder rendering and message composition

use crate::delivery::mailer::ComposedMessage;
use crate::jobs::DeliveryJob;
use courier_common::{Error, Result};
use courier_storage::repository::{ClientRepository, KindRepository, TemplateRepository};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Subject/text/html bodies with `{{.Field}}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl MessageTemplate {
    /// Used when neither the kind nor the client names a template
    pub fn builtin() -> Self {
        Self {
            subject: "CF Notification: {{.Subject}}".to_string(),
            text: "{{.Endorsement}}\n\n{{.Text}}".to_string(),
            html: "<p>{{.Endorsement}}</p>{{.HTML}}".to_string(),
        }
    }
}

/// Substitutes `{{.Field}}` placeholders; unknown fields render empty
pub struct TemplateRenderer {
    placeholder: Regex,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self {
            placeholder: Regex::new(r"\{\{\s*\.(\w+)\s*\}\}").expect("placeholder pattern is valid"),
        }
    }

    pub fn render(&self, template: &str, fields: &HashMap<&'static str, String>) -> String {
        self.placeholder
            .replace_all(template, |caps: &Captures| {
                fields.get(&caps[1]).cloned().unwrap_or_default()
            })
            .into_owned()
    }
}

/// Picks the template for a message: explicit, then kind, then client, then
/// the built-in one.
pub struct TemplateResolver {
    templates: Arc<dyn TemplateRepository>,
    clients: Arc<dyn ClientRepository>,
    kinds: Arc<dyn KindRepository>,
}

impl TemplateResolver {
    pub fn new(
        templates: Arc<dyn TemplateRepository>,
        clients: Arc<dyn ClientRepository>,
        kinds: Arc<dyn KindRepository>,
    ) -> Self {
        Self {
            templates,
            clients,
            kinds,
        }
    }

    pub async fn resolve(
        &self,
        explicit: Option<&str>,
        client_id: &str,
        kind_id: Option<&str>,
    ) -> Result<MessageTemplate> {
        if let Some(id) = explicit {
            let template = self
                .templates
                .get(id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("Template {:?} not found", id)))?;
            return Ok(MessageTemplate {
                subject: template.subject,
                text: template.text,
                html: template.html,
            });
        }

        let kind_template = match kind_id {
            Some(kind_id) => self
                .kinds
                .get(client_id, kind_id)
                .await?
                .and_then(|k| k.template_id),
            None => None,
        };
        let client_template = match kind_template {
            Some(_) => None,
            None => self.clients.get(client_id).await?.and_then(|c| c.template_id),
        };

        if let Some(id) = kind_template.or(client_template) {
            match self.templates.get(&id).await? {
                Some(template) => {
                    return Ok(MessageTemplate {
                        subject: template.subject,
                        text: template.text,
                        html: template.html,
                    })
                }
                None => warn!(template_id = %id, "Assigned template missing, using default"),
            }
        }

        Ok(MessageTemplate::builtin())
    }
}

/// Renders a delivery job into a mail ready for the transport
pub struct MessageComposer {
    renderer: TemplateRenderer,
    resolver: TemplateResolver,
}

impl MessageComposer {
    pub fn new(resolver: TemplateResolver) -> Self {
        Self {
            renderer: TemplateRenderer::new(),
            resolver,
        }
    }

    pub async fn compose(&self, job: &DeliveryJob) -> Result<ComposedMessage> {
        let options = &job.options;
        let template = self
            .resolver
            .resolve(
                options.template_id.as_deref(),
                &job.client_id,
                options.kind_id.as_deref(),
            )
            .await?;

        let mut fields: HashMap<&'static str, String> = HashMap::new();
        fields.insert("Subject", options.subject.clone());
        fields.insert("Text", options.text.clone());
        fields.insert("HTML", options.html.body_content.clone());
        fields.insert("KindDescription", options.kind_description.clone());
        fields.insert("SourceDescription", options.source_description.clone());
        fields.insert("ClientID", job.client_id.clone());
        fields.insert("MessageID", job.message_id.to_string());
        fields.insert("UserGUID", job.recipient.guid.clone().unwrap_or_default());
        fields.insert("To", job.email.clone());
        fields.insert("ReplyTo", options.reply_to.clone().unwrap_or_default());
        fields.insert(
            "Organization",
            job.organization.as_ref().map(|o| o.name.clone()).unwrap_or_default(),
        );
        fields.insert(
            "Space",
            job.space.as_ref().map(|s| s.name.clone()).unwrap_or_default(),
        );
        fields.insert(
            "OrganizationRole",
            options.role.map(|r| r.to_string()).unwrap_or_default(),
        );
        fields.insert("Scope", job.scope.clone().unwrap_or_default());

        // The endorsement is itself a template over the same fields.
        let endorsement = self.renderer.render(&options.endorsement, &fields);
        fields.insert("Endorsement", endorsement);

        let html = if options.html.is_empty() {
            None
        } else {
            let body = self.renderer.render(&template.html, &fields);
            Some(format!(
                "{}<html><head>{}</head><body{}>{}</body></html>",
                options.html.doctype,
                options.html.head,
                if options.html.body_attributes.is_empty() {
                    String::new()
                } else {
                    format!(" {}", options.html.body_attributes)
                },
                body
            ))
        };
        let text = if options.text.is_empty() && html.is_some() {
            None
        } else {
            Some(self.renderer.render(&template.text, &fields))
        };

        Ok(ComposedMessage {
            to: job.email.clone(),
            reply_to: options.reply_to.clone(),
            subject: self.renderer.render(&template.subject, &fields),
            text,
            html,
            client_id: job.client_id.clone(),
            notification_id: job.message_id,
            request_received: Some(job.received_at),
        })
    }
}
