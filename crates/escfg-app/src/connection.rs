//! Serial connection state: capability, port catalog, selection, baud rate

use serde::Serialize;

use escfg_core::prelude::*;
use escfg_core::{BaudRate, PortDescriptor};

/// Connection lifecycle data owned by the coordinator.
///
/// The selected port and baud rate are frozen while the link is open.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionState {
    has_capability: bool,
    ports: Vec<PortDescriptor>,
    selected_port: Option<usize>,
    baud_rate: BaudRate,
    is_open: bool,
}

impl ConnectionState {
    pub fn new(baud_rate: BaudRate) -> Self {
        Self {
            baud_rate,
            ..Self::default()
        }
    }

    pub fn has_capability(&self) -> bool {
        self.has_capability
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected_port
    }

    pub fn selected_port(&self) -> Option<&PortDescriptor> {
        self.selected_port.and_then(|i| self.ports.get(i))
    }

    pub fn baud_rate(&self) -> BaudRate {
        self.baud_rate
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Record the result of the environment probe. There is no retry path.
    pub fn set_capability(&mut self, present: bool) {
        if !present {
            warn!("Host has no serial support; port and connect requests will be rejected");
        }
        self.has_capability = present;
    }

    /// Replace the port catalog.
    ///
    /// The selection follows its port by name; it is cleared only when that
    /// port disappeared from the new list. While the link is open the catalog
    /// is left alone, since the active port cannot change until disconnect.
    pub fn set_ports(&mut self, ports: Vec<PortDescriptor>) {
        if self.is_open {
            debug!("Ignoring port catalog update while the link is open");
            return;
        }
        let previous = self.selected_port().map(|p| p.name.clone());
        self.ports = ports;
        self.selected_port =
            previous.and_then(|name| self.ports.iter().position(|p| p.name == name));
        debug!(
            "Port catalog updated: {} port(s), selected {:?}",
            self.ports.len(),
            self.selected_port
        );
    }

    pub fn select_port(&mut self, index: usize) -> Result<()> {
        self.ensure_capability()?;
        if self.is_open {
            return Err(Error::invalid_argument(
                "cannot change port while the connection is open",
            ));
        }
        if index >= self.ports.len() {
            return Err(Error::invalid_argument(format!(
                "port index {} out of range ({} port(s) available)",
                index,
                self.ports.len()
            )));
        }
        self.selected_port = Some(index);
        Ok(())
    }

    pub fn set_baud_rate(&mut self, value: u32) -> Result<()> {
        if self.is_open {
            return Err(Error::precondition(
                "cannot change baud rate while the connection is open",
            ));
        }
        self.baud_rate = BaudRate::new(value)?;
        Ok(())
    }

    /// Check everything `open()` needs without changing state.
    pub fn check_can_open(&self) -> Result<&PortDescriptor> {
        self.ensure_capability()?;
        if self.is_open {
            return Err(Error::precondition("connection is already open"));
        }
        self.selected_port()
            .ok_or_else(|| Error::precondition("no port selected"))
    }

    pub fn open(&mut self) -> Result<()> {
        self.check_can_open()?;
        self.is_open = true;
        Ok(())
    }

    /// Forget the selected port. Used once a link has been torn down.
    pub fn clear_selection(&mut self) {
        self.selected_port = None;
    }

    /// Close the connection. Closing a closed connection is a no-op.
    ///
    /// Returns whether the connection was open.
    pub fn close(&mut self) -> bool {
        std::mem::replace(&mut self.is_open, false)
    }

    fn ensure_capability(&self) -> Result<()> {
        if self.has_capability {
            Ok(())
        } else {
            Err(Error::precondition("serial support is not available"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports(names: &[&str]) -> Vec<PortDescriptor> {
        names.iter().map(|n| PortDescriptor::new(*n)).collect()
    }

    fn ready() -> ConnectionState {
        let mut conn = ConnectionState::default();
        conn.set_capability(true);
        conn.set_ports(ports(&["ttyACM0", "ttyACM1"]));
        conn
    }

    #[test]
    fn test_defaults() {
        let conn = ConnectionState::default();
        assert!(!conn.has_capability());
        assert!(!conn.is_open());
        assert_eq!(conn.baud_rate().value(), 115_200);
        assert!(conn.selected_port().is_none());
    }

    #[test]
    fn test_open_without_capability_mutates_nothing() {
        let mut conn = ConnectionState::default();
        conn.set_ports(ports(&["ttyACM0"]));
        let before = conn.clone();

        let err = conn.open().unwrap_err();

        assert!(matches!(err, Error::PreconditionFailed { .. }));
        assert_eq!(conn, before);
    }

    #[test]
    fn test_open_requires_selected_port() {
        let mut conn = ready();
        assert!(matches!(
            conn.open().unwrap_err(),
            Error::PreconditionFailed { .. }
        ));

        conn.select_port(1).unwrap();
        conn.open().unwrap();
        assert!(conn.is_open());
        assert_eq!(conn.selected_port().unwrap().name, "ttyACM1");
    }

    #[test]
    fn test_select_port_out_of_range() {
        let mut conn = ready();
        let err = conn.select_port(2).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
        assert!(conn.selected_index().is_none());
    }

    #[test]
    fn test_select_port_and_baud_rejected_while_open() {
        let mut conn = ready();
        conn.select_port(0).unwrap();
        conn.open().unwrap();

        assert!(matches!(
            conn.select_port(1).unwrap_err(),
            Error::InvalidArgument { .. }
        ));
        assert!(matches!(
            conn.set_baud_rate(57_600).unwrap_err(),
            Error::PreconditionFailed { .. }
        ));
        assert_eq!(conn.selected_index(), Some(0));
        assert_eq!(conn.baud_rate().value(), 115_200);
    }

    #[test]
    fn test_set_baud_rate_validates() {
        let mut conn = ready();
        conn.set_baud_rate(19_200).unwrap();
        assert_eq!(conn.baud_rate().value(), 19_200);

        let err = conn.set_baud_rate(250_000).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
        assert_eq!(conn.baud_rate().value(), 19_200);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut conn = ready();
        conn.select_port(0).unwrap();
        conn.open().unwrap();

        assert!(conn.close());
        assert!(!conn.close());
        assert!(!conn.is_open());
    }

    #[test]
    fn test_set_ports_keeps_selection_when_port_still_present() {
        let mut conn = ready();
        conn.select_port(1).unwrap();

        conn.set_ports(ports(&["ttyUSB0", "ttyACM0", "ttyACM1"]));

        assert_eq!(conn.selected_port().unwrap().name, "ttyACM1");
        assert_eq!(conn.selected_index(), Some(2));
    }

    #[test]
    fn test_set_ports_clears_selection_when_port_removed() {
        let mut conn = ready();
        conn.select_port(1).unwrap();

        conn.set_ports(ports(&["ttyACM0"]));

        assert!(conn.selected_index().is_none());
    }

    #[test]
    fn test_select_port_rejected_without_capability() {
        let mut conn = ConnectionState::default();
        conn.set_ports(ports(&["ttyACM0"]));
        assert!(matches!(
            conn.select_port(0).unwrap_err(),
            Error::PreconditionFailed { .. }
        ));
    }

    #[test]
    fn test_set_ports_ignored_while_open() {
        let mut conn = ready();
        conn.select_port(0).unwrap();
        conn.open().unwrap();

        conn.set_ports(ports(&["ttyUSB7"]));

        assert_eq!(conn.ports().len(), 2);
        assert_eq!(conn.selected_port().unwrap().name, "ttyACM0");
    }

    #[test]
    fn test_clear_selection() {
        let mut conn = ready();
        conn.select_port(1).unwrap();
        conn.clear_selection();
        assert!(conn.selected_port().is_none());
        assert_eq!(conn.ports().len(), 2);
    }
}
