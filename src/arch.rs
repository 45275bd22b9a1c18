// x86_64 primitives the channel is built on: a serializing cycle counter, a
// cache line flush, fences, and a load the compiler is not allowed to drop.
//
use std::arch::asm;
use std::arch::x86_64::{_mm_clflush, _mm_lfence, _mm_mfence};
use std::ptr;

// x86 read-time-stamp-counter-and-processor-id, returns the 64-bit cycle
// counter; waits for all earlier instructions to execute before reading it
#[inline(always)]
pub fn rdtscp() -> u64 {
    let eax: u32;
    let _ecx: u32;
    let edx: u32;
    unsafe {
        asm!(
          "rdtscp",
          lateout("eax") eax,
          lateout("ecx") _ecx,
          lateout("edx") edx,
          options(nostack)
        );
    }
    (edx as u64) << 32 | eax as u64
}

/// Evict the line holding `target` from every level of the cache hierarchy.
#[inline(always)]
pub fn flush<T>(target: &T) {
    unsafe { _mm_clflush(target as *const T as *const u8) }
}

#[inline(always)]
pub fn mfence() {
    unsafe { _mm_mfence() }
}

#[inline(always)]
pub fn lfence() {
    unsafe { _mm_lfence() }
}

/// Load `target` for its cache side effect.
#[inline(always)]
pub fn touch(target: &u8) -> u8 {
    unsafe { ptr::read_volatile(target) }
}

/// Cycles spent loading `target`.
#[inline(always)]
pub fn time_load(target: &u8) -> (u64, u8) {
    let start = rdtscp();
    let val = touch(target);
    let elapsed = rdtscp().wrapping_sub(start);
    (elapsed, val)
}
