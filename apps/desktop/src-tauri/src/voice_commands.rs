//! Voice-command form validation. The command list itself is backend-owned
//! and the settings view refetches it after every edit; the shell only vets
//! a command before sending it.

use murmur_bridge::VoiceCommand;

/// Advisory validation before a voice command is sent to the backend.
pub fn validate_voice_command(cmd: &VoiceCommand) -> Result<(), String> {
    if cmd.name.trim().is_empty() {
        return Err("Command name is required".to_string());
    }
    if cmd.phrase.trim().is_empty() {
        return Err("Trigger phrase is required".to_string());
    }
    // A bespoke command without a script has nothing to run.
    match &cmd.script {
        Some(s) if !s.trim().is_empty() => Ok(()),
        Some(_) => Err("Script must not be empty".to_string()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_bridge::ScriptKind;

    fn cmd(id: &str, name: &str, phrase: &str, script: Option<&str>) -> VoiceCommand {
        VoiceCommand {
            id: id.to_string(),
            name: name.to_string(),
            phrase: phrase.to_string(),
            script: script.map(|s| s.to_string()),
            script_kind: ScriptKind::Shell,
            enabled: true,
        }
    }

    #[test]
    fn command_needs_name_and_phrase() {
        assert!(validate_voice_command(&cmd("1", "Open chat", "open chat", None)).is_ok());
        assert!(validate_voice_command(&cmd("1", "", "open chat", None)).is_err());
        assert!(validate_voice_command(&cmd("1", "Open chat", "  ", None)).is_err());
    }

    #[test]
    fn bespoke_command_needs_nonempty_script() {
        assert!(validate_voice_command(&cmd("1", "Lock", "lock it", Some("pmset sleepnow"))).is_ok());
        assert!(validate_voice_command(&cmd("1", "Lock", "lock it", Some("   "))).is_err());
    }
}
