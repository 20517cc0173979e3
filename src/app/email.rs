use chrono::{DateTime, Locale};
use chrono_tz::Tz;

use crate::app::reminders::{appointment_instant, ReminderSettings, ScheduleError};
use crate::domain::appointment::Appointment;
use crate::domain::notification::EmailMessage;
use crate::domain::user::User;

/// Builds the day-before reminder email. Date and time are rendered from the
/// combined appointment instant in the operational timezone.
pub fn compose_reminder(
    user: &User,
    appointment: &Appointment,
    settings: &ReminderSettings,
) -> Result<EmailMessage, ScheduleError> {
    let instant = appointment_instant(&appointment.date, &appointment.time, settings.timezone)?;
    let date = long_date(&instant);
    let time = instant.format("%H:%M").to_string();
    let notes = appointment
        .notes
        .as_deref()
        .map(str::trim)
        .filter(|notes| !notes.is_empty());
    let name = user.greeting_name();

    let subject = format!("Recordatorio: tu cita en {} es mañana", settings.practice_name);

    let mut text = format!(
        "Hola {name},\n\n\
         Te recordamos que mañana tienes una cita.\n\n\
         Fecha: {date}\n\
         Hora: {time}\n"
    );
    if let Some(notes) = notes {
        text.push_str(&format!("Notas: {}\n", notes));
    }
    text.push_str(&format!(
        "\nPuedes consultar tus citas en {}\n\n\
         Si no puedes asistir, avisa a tu nutricionista con antelación.\n\n\
         {}",
        settings.app_url, settings.practice_name
    ));

    let notes_row = notes
        .map(|notes| {
            format!(
                "<p style=\"margin: 8px 0;\"><strong>Notas:</strong> {}</p>",
                escape_html(notes)
            )
        })
        .unwrap_or_default();
    let html = format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head><meta charset=\"utf-8\"></head>\n\
         <body style=\"font-family: Helvetica, Arial, sans-serif; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;\">\n\
         <div style=\"background: #16a34a; color: white; padding: 24px 20px; border-radius: 10px 10px 0 0; text-align: center;\">\n\
         <h1 style=\"margin: 0; font-size: 22px;\">Recordatorio de cita</h1>\n\
         </div>\n\
         <div style=\"border: 1px solid #e2e8f0; border-top: none; padding: 24px; border-radius: 0 0 10px 10px;\">\n\
         <p>Hola {name},</p>\n\
         <p>Te recordamos que mañana tienes una cita.</p>\n\
         <p style=\"margin: 8px 0;\"><strong>Fecha:</strong> {date}</p>\n\
         <p style=\"margin: 8px 0;\"><strong>Hora:</strong> {time}</p>\n\
         {notes_row}\n\
         <p><a href=\"{app_url}\" style=\"color: #16a34a;\">Ver mis citas</a></p>\n\
         <p>Si no puedes asistir, avisa a tu nutricionista con antelación.</p>\n\
         <p>{practice}</p>\n\
         </div>\n\
         </body>\n\
         </html>",
        name = escape_html(name),
        date = escape_html(&date),
        time = time,
        notes_row = notes_row,
        app_url = escape_html(&settings.app_url),
        practice = escape_html(&settings.practice_name),
    );

    Ok(EmailMessage {
        to: user.email.clone(),
        subject,
        html,
        text,
    })
}

/// Builds the welcome email for a new patient account. `None` when there is
/// nobody to send it to: blank address or an admin account.
pub fn compose_welcome(user: &User, settings: &ReminderSettings) -> Option<EmailMessage> {
    let to = user.email.trim();
    if to.is_empty() || user.is_admin() {
        return None;
    }
    let name = user.greeting_name();
    let practice = &settings.practice_name;
    let app_url = &settings.app_url;

    let subject = format!("Bienvenido a {} - Acceso a tu cuenta", practice);

    let text = format!(
        "Hola {name},\n\n\
         Tu cuenta en {practice} ha sido creada.\n\n\
         CREDENCIALES DE ACCESO:\n\
         - Usuario: {to}\n\
         - Contraseña temporal: solicítala a tu nutricionista\n\n\
         IMPORTANTE: en tu primer inicio de sesión deberás cambiar la contraseña temporal.\n\n\
         Accede a la aplicación en: {app_url}\n\n\
         INSTALACIÓN EN MÓVIL:\n\
         - iPhone/iPad: abre el enlace en Safari, Compartir, Añadir a pantalla de inicio\n\
         - Android: abre el enlace en Chrome, Menú, Añadir a pantalla de inicio\n\n\
         Si tienes dudas, contacta con tu nutricionista.\n\n\
         ¡Bienvenido!\n\
         {practice}"
    );

    let html = format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head><meta charset=\"utf-8\"></head>\n\
         <body style=\"font-family: Helvetica, Arial, sans-serif; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;\">\n\
         <div style=\"background: #16a34a; color: white; padding: 30px 20px; border-radius: 10px 10px 0 0; text-align: center;\">\n\
         <h1 style=\"margin: 0; font-size: 26px;\">¡Bienvenido a {practice}!</h1>\n\
         </div>\n\
         <div style=\"border: 1px solid #e2e8f0; border-top: none; padding: 30px;\">\n\
         <p>Hola <strong>{name}</strong>,</p>\n\
         <p>Tu cuenta ha sido creada. Ya puedes consultar tu plan de dieta, registrar tu peso y ver tus citas.</p>\n\
         <p style=\"background: #fef3c7; padding: 15px; border-radius: 8px;\"><strong>Importante:</strong> en tu primer inicio de sesión se te pedirá que cambies la contraseña temporal.</p>\n\
         <p style=\"margin: 8px 0;\"><strong>Usuario:</strong> {to}</p>\n\
         <p style=\"margin: 8px 0;\"><strong>Contraseña temporal:</strong> tu nutricionista te la proporcionará</p>\n\
         <p style=\"text-align: center;\"><a href=\"{app_url}\" style=\"display: inline-block; background: #16a34a; color: white; padding: 14px 30px; text-decoration: none; border-radius: 8px;\">Acceder a la aplicación</a></p>\n\
         <p>También puedes abrir este enlace: {app_url}</p>\n\
         <h4 style=\"color: #15803d;\">Instalación en móvil</h4>\n\
         <p><strong>iPhone/iPad:</strong> abre el enlace en Safari, toca Compartir y elige \"Añadir a la pantalla de inicio\".</p>\n\
         <p><strong>Android:</strong> abre el enlace en Chrome, abre el menú y elige \"Añadir a la pantalla de inicio\".</p>\n\
         <p>Si tienes alguna duda, contacta con tu nutricionista.</p>\n\
         </div>\n\
         <p style=\"text-align: center; color: #64748b; font-size: 14px;\"><strong>{practice}</strong><br>Este correo fue enviado automáticamente. Por favor, no respondas a este mensaje.</p>\n\
         </body>\n\
         </html>",
        practice = escape_html(practice),
        name = escape_html(name),
        to = escape_html(to),
        app_url = escape_html(app_url),
    );

    Some(EmailMessage {
        to: to.to_string(),
        subject,
        html,
        text,
    })
}

/// `miércoles, 21 de enero de 2026`
fn long_date(instant: &DateTime<Tz>) -> String {
    instant
        .format_localized("%A, %-d de %B de %Y", Locale::es_ES)
        .to_string()
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::user::Role;
    use chrono::Utc;
    use uuid::Uuid;

    fn patient() -> User {
        User {
            id: Uuid::new_v4(),
            email: "eucaris@example.com".to_string(),
            display_name: "Eucaris".to_string(),
            role: Role::Patient,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn renders_appointment_time_not_midnight() {
        let user = patient();
        let appointment = Appointment::new(user.id, "2026-01-21", "17:00").with_notes("1ª revision");
        let email = compose_reminder(&user, &appointment, &ReminderSettings::default()).unwrap();

        assert_eq!(email.to, "eucaris@example.com");
        assert!(email.text.contains("Hora: 17:00"));
        assert!(email.html.contains("17:00"));
        assert!(!email.text.contains("00:00"));
        assert!(!email.text.contains("01:00"));
        assert!(email.text.contains("21 de enero de 2026"));
        assert!(email.text.contains("Notas: 1ª revision"));
    }

    #[test]
    fn subject_names_practice() {
        let user = patient();
        let appointment = Appointment::new(user.id, "2026-01-21", "09:15");
        let settings = ReminderSettings {
            practice_name: "Clinica Norte".to_string(),
            ..ReminderSettings::default()
        };
        let email = compose_reminder(&user, &appointment, &settings).unwrap();
        assert_eq!(email.subject, "Recordatorio: tu cita en Clinica Norte es mañana");
        assert!(email.text.ends_with("Clinica Norte"));
    }

    #[test]
    fn html_escapes_user_text() {
        let mut user = patient();
        user.display_name = "<b>Ana</b>".to_string();
        let appointment =
            Appointment::new(user.id, "2026-01-21", "17:00").with_notes("traer análisis & dieta");
        let email = compose_reminder(&user, &appointment, &ReminderSettings::default()).unwrap();
        assert!(email.html.contains("&lt;b&gt;Ana&lt;/b&gt;"));
        assert!(email.html.contains("traer análisis &amp; dieta"));
        assert!(email.text.contains("Hola <b>Ana</b>"));
    }

    #[test]
    fn blank_notes_are_omitted() {
        let user = patient();
        let appointment = Appointment::new(user.id, "2026-01-21", "17:00").with_notes("   ");
        let email = compose_reminder(&user, &appointment, &ReminderSettings::default()).unwrap();
        assert!(!email.text.contains("Notas"));
        assert!(!email.html.contains("Notas"));
    }

    #[test]
    fn falls_back_to_email_when_name_is_blank() {
        let mut user = patient();
        user.display_name = " ".to_string();
        let appointment = Appointment::new(user.id, "2026-01-21", "17:00");
        let email = compose_reminder(&user, &appointment, &ReminderSettings::default()).unwrap();
        assert!(email.text.starts_with("Hola eucaris@example.com,"));
    }

    #[test]
    fn welcome_email_links_app_and_names_account() {
        let user = patient();
        let email = compose_welcome(&user, &ReminderSettings::default()).unwrap();

        assert_eq!(email.to, "eucaris@example.com");
        assert_eq!(email.subject, "Bienvenido a Ruiz Nutrición - Acceso a tu cuenta");
        assert!(email.text.starts_with("Hola Eucaris,"));
        assert!(email.text.contains("Usuario: eucaris@example.com"));
        assert!(email.text.contains("https://nutricionapp-b7b7d.web.app"));
        assert!(email.text.contains("INSTALACIÓN EN MÓVIL"));
        assert!(email.html.contains("href=\"https://nutricionapp-b7b7d.web.app\""));
    }

    #[test]
    fn welcome_skips_blank_address_and_admins() {
        let mut user = patient();
        user.email = "  ".to_string();
        assert!(compose_welcome(&user, &ReminderSettings::default()).is_none());

        let mut admin = patient();
        admin.role = Role::Admin;
        assert!(compose_welcome(&admin, &ReminderSettings::default()).is_none());
    }

    #[test]
    fn malformed_time_is_rejected() {
        let user = patient();
        let appointment = Appointment::new(user.id, "2026-01-21", "5pm");
        assert!(compose_reminder(&user, &appointment, &ReminderSettings::default()).is_err());
    }
}
