//! Binary header parsing and program installation, the step between
//! reading an assembled file and handing bytes to [`crate::processor`].

use crate::assembler::HEADER;
use crate::bus::Bus;
use crate::error::FvcResult;
use crate::processor::Processor;

/// Strips the four-byte magic header if present; a raw (headerless) image
/// is passed through unchanged.
pub fn strip_header(binary: &[u8]) -> &[u8] {
    binary.strip_prefix(&HEADER[..]).unwrap_or(binary)
}

/// Installs a binary into `bus` at [`crate::processor::LOAD_ADDRESS`] and
/// points `cpu` at it.
pub fn install(cpu: &mut Processor, bus: &mut Bus, binary: &[u8]) -> FvcResult<()> {
    cpu.load(bus, strip_header(binary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::AudioStub;
    use crate::display::Display;

    #[test]
    fn strips_header_when_present() {
        let mut binary = HEADER.to_vec();
        binary.push(5);
        assert_eq!(strip_header(&binary), &[5]);
    }

    #[test]
    fn passes_through_raw_images() {
        assert_eq!(strip_header(&[5]), &[5]);
    }

    #[test]
    fn install_loads_into_processor() {
        let mut bus = Bus::new(Display::new(), AudioStub::new());
        let mut cpu = Processor::new();
        let mut binary = HEADER.to_vec();
        binary.push(5);
        install(&mut cpu, &mut bus, &binary).unwrap();
        cpu.run(&mut bus).unwrap();
        assert_eq!(cpu.opc(), 5);
    }
}
