/// Where the rendered help and error messages go.
pub(crate) trait UserInterface {
    fn print_help(&self, message: String);
    fn print_error(&self, message: String);
}

#[derive(Default)]
pub(crate) struct ConsoleInterface {}

impl UserInterface for ConsoleInterface {
    fn print_help(&self, message: String) {
        eprintln!("{}", message.trim_end());
    }

    fn print_error(&self, message: String) {
        eprintln!("{}", message.trim_end());
    }
}


#[cfg(test)]
mod tests {
    use super::util::*;
    use super::*;

    #[test]
    fn in_memory_interface() {
        // Setup
        let interface = InMemoryInterface::default();

        // Execute
        interface.print_help("a".to_string());
        interface.print_help("b".to_string());
        interface.print_error("first".to_string());
        interface.print_error("second".to_string());

        // Verify
        assert_eq!(
            interface.consume(),
            (Some("a\nb".to_string()), Some("first".to_string()))
        );
    }

    #[test]
    fn channel_interface_roundtrip() {
        // Setup
        let (sender, receiver) = channel_interface();

        // Execute
        sender.print_help("usage".to_string());
        drop(sender);

        // Verify
        assert_eq!(receiver.consume_message(), "usage");
    }
}
