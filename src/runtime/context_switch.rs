//! Abstraction over stackful multitasking.
//!
//! Provides an implementation for every CPU architecture.

use core::arch::global_asm;

/// Handle to a stack pointer set up for context switching.
#[repr(transparent)]
#[derive(Debug, Copy, Clone)]
pub(crate) struct Continuation(*const ());

extern "C" {
    /// Initializes a stack for context switching.
    ///
    /// Jumping to the returned continuation starts `entry` on that stack.
    #[link_name = "cofiber_prepare_stack"]
    pub(crate) fn prepare_stack(stack: *mut u8, entry: unsafe extern "C" fn() -> !) -> Continuation;

    /// Executes a context switch.
    ///
    /// Spills registers, sets [from] to updated stack pointer.
    /// Sets stack pointer to [to], restores registers.
    #[link_name = "cofiber_jump"]
    pub(crate) fn jump(from: *mut Continuation, to: *const Continuation);

    /// Second core entry point.
    ///
    /// Expects the stack pointer on a boot frame whose first word is a function taking the frame.
    #[link_name = "cofiber_boot"]
    pub(crate) fn boot() -> !;
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "arm")))]
compile_error!("cofiber only supports x86_64, aarch64 and arm");

#[cfg(any(target_vendor = "apple", target_os = "windows"))]
compile_error!("cofiber's context switch only supports ELF targets with the System V calling convention");

#[cfg(target_arch = "x86_64")]
global_asm!(include_str!("assembly/x86_64.s"), options(raw));

#[cfg(target_arch = "aarch64")]
global_asm!(include_str!("assembly/aarch64.s"), options(raw));

#[cfg(all(target_arch = "arm", not(target_abi = "eabihf")))]
global_asm!(include_str!("assembly/arm.s"), options(raw));

#[cfg(all(target_arch = "arm", target_abi = "eabihf"))]
global_asm!(include_str!("assembly/arm_hf.s"), options(raw));
