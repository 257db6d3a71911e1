/// Mail bodies are rendered by pure functions so they can be tested without
/// any transport in the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailTemplate {
    Cancellation,
}

#[derive(Debug, Clone)]
pub struct TemplateContext {
    pub provider: String,
    pub requester: String,
    pub date: String,
}

pub fn subject(template: MailTemplate) -> &'static str {
    match template {
        MailTemplate::Cancellation => "Agendamento cancelado",
    }
}

pub fn render(template: MailTemplate, ctx: &TemplateContext) -> String {
    match template {
        MailTemplate::Cancellation => format!(
            "Olá, {provider},\n\n\
             O agendamento de {requester} marcado para {date} foi cancelado.\n\
             O horário voltou a ficar disponível para novas reservas.\n\n\
             Equipe Slotbook",
            provider = ctx.provider,
            requester = ctx.requester,
            date = ctx.date,
        ),
    }
}
