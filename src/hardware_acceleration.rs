//! Hardware-accelerated decode path for [`FfmpegDecoder`](crate::FfmpegDecoder).
//!
//! Available with the `hardware` feature. When a request asks for hardware
//! decoding, the decoder tries to attach an FFmpeg hardware device context
//! to the codec. Any failure falls back to software decoding and the reason
//! is reported back to the caller in
//! [`DecodedFrame::hardware_fallback`](crate::DecodedFrame).

use ffmpeg_next::{
    codec::context::Context as CodecContext, decoder::Video as VideoDecoder,
    frame::Video as VideoFrame,
};
use ffmpeg_sys_next::{
    AV_CODEC_HW_CONFIG_METHOD_HW_DEVICE_CTX, AVBufferRef, AVCodecContext, AVCodecHWConfig,
    AVHWDeviceType,
};

use crate::error::DecodeError;

/// Hardware device families FFmpeg can decode on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareDevice {
    /// NVIDIA CUDA / NVDEC.
    Cuda,
    /// Video Acceleration API (Linux).
    Vaapi,
    /// Direct3D 11 (Windows).
    D3d11va,
    /// Apple VideoToolbox.
    VideoToolbox,
    /// Intel Quick Sync Video.
    Qsv,
}

impl HardwareDevice {
    /// Parse a device name such as `"cuda"` or `"vaapi"`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "cuda" | "nvdec" => Some(HardwareDevice::Cuda),
            "vaapi" => Some(HardwareDevice::Vaapi),
            "d3d11va" => Some(HardwareDevice::D3d11va),
            "videotoolbox" => Some(HardwareDevice::VideoToolbox),
            "qsv" => Some(HardwareDevice::Qsv),
            _ => None,
        }
    }

    fn to_av(self) -> AVHWDeviceType {
        match self {
            HardwareDevice::Cuda => AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA,
            HardwareDevice::Vaapi => AVHWDeviceType::AV_HWDEVICE_TYPE_VAAPI,
            HardwareDevice::D3d11va => AVHWDeviceType::AV_HWDEVICE_TYPE_D3D11VA,
            HardwareDevice::VideoToolbox => AVHWDeviceType::AV_HWDEVICE_TYPE_VIDEOTOOLBOX,
            HardwareDevice::Qsv => AVHWDeviceType::AV_HWDEVICE_TYPE_QSV,
        }
    }

    fn from_av(device_type: AVHWDeviceType) -> Option<Self> {
        match device_type {
            AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA => Some(HardwareDevice::Cuda),
            AVHWDeviceType::AV_HWDEVICE_TYPE_VAAPI => Some(HardwareDevice::Vaapi),
            AVHWDeviceType::AV_HWDEVICE_TYPE_D3D11VA => Some(HardwareDevice::D3d11va),
            AVHWDeviceType::AV_HWDEVICE_TYPE_VIDEOTOOLBOX => Some(HardwareDevice::VideoToolbox),
            AVHWDeviceType::AV_HWDEVICE_TYPE_QSV => Some(HardwareDevice::Qsv),
            _ => None,
        }
    }
}

/// Hardware device types compiled into the linked FFmpeg.
pub fn available_hardware_devices() -> Vec<HardwareDevice> {
    let mut devices = Vec::new();
    let mut device_type = AVHWDeviceType::AV_HWDEVICE_TYPE_NONE;

    loop {
        device_type = unsafe { ffmpeg_sys_next::av_hwdevice_iterate_types(device_type) };
        if device_type == AVHWDeviceType::AV_HWDEVICE_TYPE_NONE {
            break;
        }
        if let Some(device) = HardwareDevice::from_av(device_type) {
            devices.push(device);
        }
    }

    devices
}

/// A decoder plus whether hardware ended up attached.
pub(crate) struct HardwareDecoderSetup {
    pub decoder: VideoDecoder,
    /// `None` when hardware is active, otherwise why it is not.
    pub fallback_reason: Option<String>,
}

/// Build a decoder for `codec_context`, attaching `preferred` (or the
/// codec's first supported device) when possible.
pub(crate) fn open_hardware_decoder(
    codec_context: CodecContext,
    preferred: Option<HardwareDevice>,
) -> Result<HardwareDecoderSetup, DecodeError> {
    let device_type = match preferred {
        Some(device) => {
            let av_type = device.to_av();
            supported_device_types(&codec_context)
                .contains(&av_type)
                .then_some(av_type)
        }
        None => supported_device_types(&codec_context).first().copied(),
    };

    let Some(av_device_type) = device_type else {
        let decoder = codec_context.decoder().video()?;
        return Ok(HardwareDecoderSetup {
            decoder,
            fallback_reason: Some("codec has no supported hardware device".to_string()),
        });
    };

    match create_device_context(av_device_type) {
        Ok(device_context) => {
            unsafe {
                let context_pointer = codec_context.as_ptr() as *mut AVCodecContext;
                (*context_pointer).hw_device_ctx = ffmpeg_sys_next::av_buffer_ref(device_context);
            }
            let decoder = codec_context.decoder().video()?;
            // The codec context holds its own reference now.
            unsafe {
                let mut reference = device_context;
                ffmpeg_sys_next::av_buffer_unref(&mut reference);
            }
            Ok(HardwareDecoderSetup {
                decoder,
                fallback_reason: None,
            })
        }
        Err(error) => {
            let decoder = codec_context.decoder().video()?;
            Ok(HardwareDecoderSetup {
                decoder,
                fallback_reason: Some(error.to_string()),
            })
        }
    }
}

/// Copy a GPU surface into a system-memory frame.
///
/// Fails for frames that already live in system memory; callers then use
/// the original frame.
pub(crate) fn transfer_to_system_memory(
    hardware_frame: &VideoFrame,
) -> Result<VideoFrame, DecodeError> {
    let mut software_frame = VideoFrame::empty();
    let result = unsafe {
        ffmpeg_sys_next::av_hwframe_transfer_data(
            software_frame.as_mut_ptr(),
            hardware_frame.as_ptr(),
            0,
        )
    };
    if result < 0 {
        return Err(DecodeError::Backend(format!(
            "hardware frame transfer failed (result={result})"
        )));
    }
    unsafe {
        (*software_frame.as_mut_ptr()).pts = (*hardware_frame.as_ptr()).pts;
    }
    Ok(software_frame)
}

fn supported_device_types(codec_context: &CodecContext) -> Vec<AVHWDeviceType> {
    let codec_pointer = unsafe { (*codec_context.as_ptr()).codec };
    if codec_pointer.is_null() {
        return Vec::new();
    }

    let mut types = Vec::new();
    let mut index: i32 = 0;
    loop {
        let config: *const AVCodecHWConfig =
            unsafe { ffmpeg_sys_next::avcodec_get_hw_config(codec_pointer, index) };
        if config.is_null() {
            break;
        }
        let methods = unsafe { (*config).methods };
        let device_type = unsafe { (*config).device_type };
        if methods & (AV_CODEC_HW_CONFIG_METHOD_HW_DEVICE_CTX as i32) != 0
            && device_type != AVHWDeviceType::AV_HWDEVICE_TYPE_NONE
        {
            types.push(device_type);
        }
        index += 1;
    }
    types
}

fn create_device_context(device_type: AVHWDeviceType) -> Result<*mut AVBufferRef, DecodeError> {
    let mut device_context: *mut AVBufferRef = std::ptr::null_mut();
    let result = unsafe {
        ffmpeg_sys_next::av_hwdevice_ctx_create(
            &mut device_context,
            device_type,
            std::ptr::null(),
            std::ptr::null_mut(),
            0,
        )
    };
    if result < 0 {
        Err(DecodeError::Backend(format!(
            "failed to create hardware device context (result={result})"
        )))
    } else {
        Ok(device_context)
    }
}
