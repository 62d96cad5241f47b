use crate::Bus;

/// A CPU that can execute instructions.
///
/// The type parameter `B` is the bus type this CPU operates on.
pub trait Cpu<B: Bus> {
    /// Execute one instruction atomically. Returns cycles consumed.
    fn step(&mut self, bus: &mut B) -> u32;

    /// Reset the CPU, loading the program counter from the reset vector.
    fn reset(&mut self, bus: &mut B);

    /// Assert the maskable interrupt line. The line stays asserted until
    /// released; the interrupt is taken at an instruction boundary when
    /// the I flag is clear.
    fn irq_assert(&mut self);

    /// Release the maskable interrupt line.
    fn irq_release(&mut self);

    /// Signal a non-maskable interrupt edge. Always honoured at the next
    /// instruction boundary.
    fn nmi(&mut self);

    /// Get the current program counter.
    fn pc(&self) -> u16;
}
