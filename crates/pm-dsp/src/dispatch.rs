//! Kernel dispatch
//!
//! Capability detection runs once; after that every call goes through a
//! static fn-pointer table with zero overhead. The scalar table is always
//! available and is the reference the SSE2 table is tested against.

use std::sync::OnceLock;

use log::debug;
use pm_core::DspImplHint;

use crate::kernels as kernels_mod;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
use crate::kernels_sse;
use crate::{PowerData, Ramp, StereoRamps};

/// Resolved kernel implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DspImpl {
    Scalar,
    Sse2,
}

impl DspImpl {
    pub const fn name(self) -> &'static str {
        match self {
            DspImpl::Scalar => "scalar",
            DspImpl::Sse2 => "sse2",
        }
    }
}

/// Fn-pointer table of every kernel the mixer calls.
pub struct Kernels {
    pub mix_mono_to_stereo: fn(&mut [f32], &mut [f32], &[f32], Ramp, Ramp),
    pub mix_stereo_to_stereo: fn(&mut [f32], &mut [f32], &[f32], &[f32], &StereoRamps),
    pub resample_mix_mono_to_stereo:
        fn(&mut [f32], &mut [f32], &[f32], usize, u64, u64, Ramp, Ramp) -> u64,
    pub resample_mix_stereo_to_stereo:
        fn(&mut [f32], &mut [f32], &[f32], &[f32], usize, u64, u64, &StereoRamps) -> u64,
    pub apply_clamped_gain: fn(&mut [f32], &mut [f32], &[f32], &[f32], Ramp),
    pub apply_gain: fn(&mut [f32], &mut [f32], &[f32], &[f32], Ramp),
    pub apply_gain_and_interleave_to_s16: fn(&mut [i16], &[f32], &[f32], Ramp),
    pub gather_power: fn(&[f32], &[f32], f32) -> PowerData,
    pub convert_from_s8: fn(&mut [f32], &[i8]),
    pub convert_from_s16: fn(&mut [f32], &[i16]),
    pub deinterleave: fn(&mut [f32], &mut [f32], &[f32]),
    pub deinterleave_from_s8: fn(&mut [f32], &mut [f32], &[i8]),
    pub deinterleave_from_s16: fn(&mut [f32], &mut [f32], &[i16]),
    pub impl_kind: DspImpl,
}

impl Kernels {
    pub(crate) const SCALAR: Kernels = Kernels {
        mix_mono_to_stereo: kernels_mod::mix_mono_to_stereo,
        mix_stereo_to_stereo: kernels_mod::mix_stereo_to_stereo,
        resample_mix_mono_to_stereo: kernels_mod::resample_mix_mono_to_stereo,
        resample_mix_stereo_to_stereo: kernels_mod::resample_mix_stereo_to_stereo,
        apply_clamped_gain: kernels_mod::apply_clamped_gain,
        apply_gain: kernels_mod::apply_gain,
        apply_gain_and_interleave_to_s16: kernels_mod::apply_gain_and_interleave_to_s16,
        gather_power: kernels_mod::gather_power,
        convert_from_s8: kernels_mod::convert_from_s8,
        convert_from_s16: kernels_mod::convert_from_s16,
        deinterleave: kernels_mod::deinterleave,
        deinterleave_from_s8: kernels_mod::deinterleave_from_s8,
        deinterleave_from_s16: kernels_mod::deinterleave_from_s16,
        impl_kind: DspImpl::Scalar,
    };

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    pub(crate) const SSE2: Kernels = Kernels {
        mix_mono_to_stereo: kernels_sse::mix_mono_to_stereo,
        mix_stereo_to_stereo: kernels_sse::mix_stereo_to_stereo,
        resample_mix_mono_to_stereo: kernels_sse::resample_mix_mono_to_stereo,
        resample_mix_stereo_to_stereo: kernels_sse::resample_mix_stereo_to_stereo,
        apply_clamped_gain: kernels_sse::apply_clamped_gain,
        apply_gain: kernels_sse::apply_gain,
        apply_gain_and_interleave_to_s16: kernels_sse::apply_gain_and_interleave_to_s16,
        gather_power: kernels_sse::gather_power,
        // 8-bit sources are rare enough that the scalar converters serve
        // both tables
        convert_from_s8: kernels_mod::convert_from_s8,
        convert_from_s16: kernels_sse::convert_from_s16,
        deinterleave: kernels_sse::deinterleave,
        deinterleave_from_s8: kernels_mod::deinterleave_from_s8,
        deinterleave_from_s16: kernels_sse::deinterleave_from_s16,
        impl_kind: DspImpl::Sse2,
    };

    fn for_impl(which: DspImpl) -> &'static Kernels {
        match which {
            DspImpl::Scalar => &Self::SCALAR,
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            DspImpl::Sse2 => &Self::SSE2,
            #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
            DspImpl::Sse2 => &Self::SCALAR,
        }
    }
}

fn probe() -> DspImpl {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        if std::arch::is_x86_feature_detected!("sse2") {
            return DspImpl::Sse2;
        }
    }
    DspImpl::Scalar
}

fn resolve(hint: DspImplHint) -> DspImpl {
    match hint {
        DspImplHint::Scalar => DspImpl::Scalar,
        DspImplHint::Sse2 if probe() == DspImpl::Sse2 => DspImpl::Sse2,
        DspImplHint::Sse2 => DspImpl::Scalar,
        DspImplHint::Default => probe(),
    }
}

static KERNELS: OnceLock<&'static Kernels> = OnceLock::new();

/// Pick the kernel implementation for this process. The first call wins;
/// later hints are ignored (the mixer is already running on the chosen
/// table).
pub fn select_impl(hint: DspImplHint) -> DspImpl {
    let table = KERNELS.get_or_init(|| {
        let which = resolve(hint);
        debug!("dsp kernels: {}", which.name());
        Kernels::for_impl(which)
    });
    table.impl_kind
}

/// The active kernel table, probing capabilities if nothing was selected.
#[inline]
pub fn kernels() -> &'static Kernels {
    KERNELS.get_or_init(|| Kernels::for_impl(resolve(DspImplHint::Default)))
}
