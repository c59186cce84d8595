//! Windows.Graphics.Capture backend.
//!
//! Requires Windows 10 1803+ (build 17134).
//!
//! ```text
//! source id ──▶ IsWindow(HWND)? ──▶ CreateForWindow
//!           └─▶ HMONITOR listed? ──▶ CreateForMonitor
//!   │
//!   ▼
//! GraphicsCaptureItem
//!   │  Direct3D11CaptureFramePool::CreateFreeThreaded (BGRA8, 1-3 buffers by quality)
//!   ▼
//! GraphicsCaptureSession::StartCapture()
//!   │  FrameArrived (thread-pool thread)
//!   ▼
//! ID3D11Texture2D ──CopyResource──▶ staging texture ──Map(READ)──▶ FrameData ──▶ dispatcher
//! ```
//!
//! If the surface cannot be read a gray placeholder of the expected size is
//! delivered instead.

use std::ffi::c_void;
use std::sync::{Arc, Mutex};

use mirror_core::{
    pixels, CaptureConfig, CaptureError, FrameData, Monitor, SourceId, WindowInfo,
    FRAME_BYTES_PER_PIXEL,
};
use mirror_renderer::{D3D11Device, DeviceHandle};
use tracing::{debug, info, warn};
use windows::{
    core::{Interface, PWSTR},
    Foundation::TypedEventHandler,
    Graphics::{
        Capture::{
            Direct3D11CaptureFrame, Direct3D11CaptureFramePool, GraphicsCaptureItem,
            GraphicsCaptureSession,
        },
        DirectX::{Direct3D11::IDirect3DDevice, DirectXPixelFormat},
        SizeInt32,
    },
    Win32::{
        Foundation::{CloseHandle, BOOL, E_POINTER, HWND, LPARAM, RECT},
        Graphics::{
            Direct3D11::{
                ID3D11Device, ID3D11DeviceContext, ID3D11Texture2D, D3D11_CPU_ACCESS_READ,
                D3D11_MAPPED_SUBRESOURCE, D3D11_MAP_READ, D3D11_TEXTURE2D_DESC,
                D3D11_USAGE_STAGING,
            },
            Dxgi::{
                Common::{DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_SAMPLE_DESC},
                IDXGIDevice,
            },
            Gdi::{EnumDisplayMonitors, GetMonitorInfoW, HDC, HMONITOR, MONITORINFO, MONITORINFOEXW},
        },
        System::{
            Threading::{
                OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
                PROCESS_QUERY_LIMITED_INFORMATION,
            },
            WinRT::{
                Direct3D11::{CreateDirect3D11DeviceFromDXGIDevice, IDirect3DDxgiInterfaceAccess},
                Graphics::Capture::IGraphicsCaptureItemInterop,
                RoInitialize, RO_INIT_MULTITHREADED,
            },
        },
        UI::{
            HiDpi::{GetDpiForMonitor, MDT_EFFECTIVE_DPI},
            WindowsAndMessaging::{
                EnumWindows, GetCursorInfo, GetWindowRect, GetWindowTextW,
                GetWindowThreadProcessId, IsIconic, IsWindow, IsWindowVisible, CURSORINFO,
                CURSORINFO_FLAGS, CURSOR_SHOWING,
            },
        },
    },
};

use crate::backend::{ActiveCapture, CaptureBackend, CaptureTarget, TargetKind};
use crate::dispatch::{timestamp_ms, FrameDispatcher};

const MONITORINFOF_PRIMARY: u32 = 1;
const PIXEL_FORMAT: DirectXPixelFormat = DirectXPixelFormat::B8G8R8A8UIntNormalized;

// ── WgcBackend ────────────────────────────────────────────────────────────────

struct WgcDevice {
    d3d:   D3D11Device,
    winrt: IDirect3DDevice,
}

// SAFETY: the WinRT device wraps a free-threaded D3D11 device.
unsafe impl Send for WgcDevice {}

#[derive(Default)]
pub struct WgcBackend {
    device: Option<WgcDevice>,
}

impl CaptureBackend for WgcBackend {
    fn platform_name(&self) -> &'static str {
        "Windows"
    }

    fn is_supported(&self) -> bool {
        GraphicsCaptureSession::IsSupported().unwrap_or(false)
    }

    fn probe(&mut self) -> Result<(), CaptureError> {
        // Initialise WinRT on this thread (no-op if already done)
        unsafe {
            let _ = RoInitialize(RO_INIT_MULTITHREADED);
        }
        if !self.is_supported() {
            return Err(CaptureError::Unsupported {
                platform: "Windows (Graphics Capture unavailable)".into(),
            });
        }
        Ok(())
    }

    fn attach_device(&mut self, device: &DeviceHandle) -> Result<(), CaptureError> {
        let d3d = match device {
            DeviceHandle::D3D11(dev) => dev.clone(),
            other => {
                info!("{} device given, creating a D3D11 device for capture", other.kind());
                D3D11Device::create_hardware().map_err(|e| CaptureError::InvalidDevice {
                    reason: e.to_string(),
                })?
            }
        };

        let dxgi: IDXGIDevice = d3d.raw().cast().map_err(|e| CaptureError::InvalidDevice {
            reason: format!("cast IDXGIDevice: {e}"),
        })?;
        let inspectable = unsafe { CreateDirect3D11DeviceFromDXGIDevice(&dxgi) }
            .map_err(|e| CaptureError::backend("CreateDirect3D11DeviceFromDXGIDevice", e))?;
        let winrt: IDirect3DDevice = inspectable
            .cast()
            .map_err(|e| CaptureError::backend("cast IDirect3DDevice", e))?;

        self.device = Some(WgcDevice { d3d, winrt });
        Ok(())
    }

    fn monitors(&self) -> Result<Vec<Monitor>, CaptureError> {
        Ok(enumerate_monitors()
            .into_iter()
            .filter_map(monitor_info)
            .collect())
    }

    fn windows(&self) -> Result<Vec<WindowInfo>, CaptureError> {
        Ok(enumerate_windows()?
            .into_iter()
            .filter_map(window_info)
            .collect())
    }

    fn resolve(&self, id: &SourceId) -> Option<CaptureTarget> {
        let raw: usize = id.as_str().parse().ok()?;

        let hwnd = HWND(raw as *mut c_void);
        if unsafe { IsWindow(hwnd) }.as_bool() {
            let rect = window_rect(hwnd)?;
            return Some(CaptureTarget {
                id: id.clone(),
                kind: TargetKind::Window,
                handle: raw,
                width: rect_width(&rect),
                height: rect_height(&rect),
            });
        }

        enumerate_monitors()
            .into_iter()
            .find(|h| h.0 as usize == raw)
            .and_then(monitor_info)
            .map(|m| CaptureTarget {
                id: id.clone(),
                kind: TargetKind::Monitor,
                handle: raw,
                width: m.width,
                height: m.height,
            })
    }

    fn open(
        &mut self,
        target: &CaptureTarget,
        config: &CaptureConfig,
        dispatcher: Arc<FrameDispatcher>,
    ) -> Result<Box<dyn ActiveCapture>, CaptureError> {
        let device = self.device.as_ref().ok_or_else(|| CaptureError::InvalidDevice {
            reason: "no D3D11 device attached".into(),
        })?;

        // ── 1. Capture item from the native handle ────────────────────────
        let interop = windows::core::factory::<GraphicsCaptureItem, IGraphicsCaptureItemInterop>()
            .map_err(|e| CaptureError::backend("IGraphicsCaptureItemInterop factory", e))?;
        let item: GraphicsCaptureItem = unsafe {
            match target.kind {
                TargetKind::Window => interop.CreateForWindow(HWND(target.handle as *mut c_void)),
                TargetKind::Monitor => {
                    interop.CreateForMonitor(HMONITOR(target.handle as *mut c_void))
                }
            }
        }
        .map_err(|e| CaptureError::backend("CreateForWindow/CreateForMonitor", e))?;
        let size = item
            .Size()
            .map_err(|e| CaptureError::backend("GraphicsCaptureItem::Size", e))?;

        // ── 2. Frame pool + session ───────────────────────────────────────
        let buffers = config.quality.frame_pool_buffers() as i32;
        let pool =
            Direct3D11CaptureFramePool::CreateFreeThreaded(&device.winrt, PIXEL_FORMAT, buffers, size)
                .map_err(|e| CaptureError::backend("CreateFreeThreaded frame pool", e))?;
        let session = pool
            .CreateCaptureSession(&item)
            .map_err(|e| CaptureError::backend("CreateCaptureSession", e))?;
        // Both setters need newer Windows builds; older ones keep the defaults.
        if let Err(e) = session.SetIsBorderRequired(config.include_borders) {
            debug!("SetIsBorderRequired unsupported: {e}");
        }
        if let Err(e) = session.SetIsCursorCaptureEnabled(config.include_cursor) {
            debug!("SetIsCursorCaptureEnabled unsupported: {e}");
        }

        // ── 3. FrameArrived → staging readback → dispatcher ───────────────
        let mut context: Option<ID3D11DeviceContext> = None;
        unsafe { device.d3d.raw().GetImmediateContext(&mut context) };
        let context = context.ok_or_else(|| CaptureError::InvalidDevice {
            reason: "device has no immediate context".into(),
        })?;

        let shared_size = Arc::new(Mutex::new((size.Width as u32, size.Height as u32)));
        let reader = Arc::new(Mutex::new(FrameReader {
            device: device.d3d.raw().clone(),
            context,
            winrt_device: device.winrt.clone(),
            staging: None,
            size,
            buffers,
            shared_size: shared_size.clone(),
            dispatcher,
        }));

        pool.FrameArrived(&TypedEventHandler::new(
            move |pool_ref: &Option<Direct3D11CaptureFramePool>, _| {
                if let Some(pool) = pool_ref {
                    reader
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .on_frame_arrived(pool);
                }
                Ok(())
            },
        ))
        .map_err(|e| CaptureError::backend("FrameArrived handler", e))?;

        // ── 4. Start ──────────────────────────────────────────────────────
        session
            .StartCapture()
            .map_err(|e| CaptureError::backend("StartCapture", e))?;
        info!(
            "WGC capture started on {:?} {} ({}x{}, {} buffers)",
            target.kind, target.id, size.Width, size.Height, buffers
        );

        Ok(Box::new(WgcCapture {
            session,
            pool,
            size: shared_size,
        }))
    }

    /// System cursor state. Reads as hidden when the query fails (secure desktop).
    fn is_cursor_visible(&self) -> bool {
        let mut info = CURSORINFO {
            cbSize: std::mem::size_of::<CURSORINFO>() as u32,
            ..Default::default()
        };
        match unsafe { GetCursorInfo(&mut info) } {
            Ok(()) => cursor_showing(info.flags),
            Err(e) => {
                debug!("GetCursorInfo failed: {e}");
                false
            }
        }
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

struct WgcCapture {
    session: GraphicsCaptureSession,
    pool:    Direct3D11CaptureFramePool,
    size:    Arc<Mutex<(u32, u32)>>,
}

// SAFETY: WinRT capture objects are agile.
unsafe impl Send for WgcCapture {}

impl ActiveCapture for WgcCapture {
    fn size(&self) -> (u32, u32) {
        *self.size.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn close(self: Box<Self>) {
        if let Err(e) = self.session.Close() {
            warn!("GraphicsCaptureSession::Close: {e}");
        }
        if let Err(e) = self.pool.Close() {
            warn!("Direct3D11CaptureFramePool::Close: {e}");
        }
        info!("WGC capture closed");
    }
}

/// State owned by the `FrameArrived` handler.
struct FrameReader {
    device:       ID3D11Device,
    context:      ID3D11DeviceContext,
    winrt_device: IDirect3DDevice,
    staging:      Option<(ID3D11Texture2D, u32, u32)>,
    size:         SizeInt32,
    buffers:      i32,
    shared_size:  Arc<Mutex<(u32, u32)>>,
    dispatcher:   Arc<FrameDispatcher>,
}

// SAFETY: only used behind the handler's mutex; the D3D11 device is
// free-threaded and the immediate context is touched by this handler alone.
unsafe impl Send for FrameReader {}

impl FrameReader {
    fn on_frame_arrived(&mut self, pool: &Direct3D11CaptureFramePool) {
        let frame = match pool.TryGetNextFrame() {
            Ok(frame) => frame,
            Err(e) => {
                debug!("TryGetNextFrame: {e}");
                self.dispatcher.record_surface_loss();
                return;
            }
        };

        if let Ok(content) = frame.ContentSize() {
            let changed = content.Width != self.size.Width || content.Height != self.size.Height;
            if changed && content.Width > 0 && content.Height > 0 {
                self.recreate_pool(pool, content);
            }
        }

        let (width, height) = (self.size.Width as u32, self.size.Height as u32);
        if let Err(e) = self.read_frame(&frame, width, height) {
            warn!("Surface extraction failed, sending placeholder: {e}");
            self.dispatcher
                .deliver_placeholder(width, height, timestamp_ms());
        }
        let _ = frame.Close();
    }

    fn recreate_pool(&mut self, pool: &Direct3D11CaptureFramePool, size: SizeInt32) {
        match pool.Recreate(&self.winrt_device, PIXEL_FORMAT, self.buffers, size) {
            Ok(()) => {
                info!(
                    "Capture size {}x{} -> {}x{}, frame pool recreated",
                    self.size.Width, self.size.Height, size.Width, size.Height
                );
                self.size = size;
                *self.shared_size.lock().unwrap_or_else(|e| e.into_inner()) =
                    (size.Width as u32, size.Height as u32);
            }
            Err(e) => warn!("Frame pool Recreate: {e}"),
        }
    }

    fn read_frame(
        &mut self,
        frame: &Direct3D11CaptureFrame,
        width: u32,
        height: u32,
    ) -> windows::core::Result<()> {
        let surface = frame.Surface()?;
        let access: IDirect3DDxgiInterfaceAccess = surface.cast()?;
        let texture: ID3D11Texture2D = unsafe { access.GetInterface()? };

        let mut desc = D3D11_TEXTURE2D_DESC::default();
        unsafe { texture.GetDesc(&mut desc) };
        // The pool texture can be larger than the content until it is recreated.
        let width = width.min(desc.Width);
        let height = height.min(desc.Height);

        let staging = self.staging_texture(desc.Width, desc.Height)?;
        unsafe { self.context.CopyResource(&staging, &texture) };

        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe { self.context.Map(&staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped))? };

        let stride = mapped.RowPitch as usize;
        let len = pixels::required_len(
            stride,
            width as usize * FRAME_BYTES_PER_PIXEL,
            height as usize,
        );
        // SAFETY: the mapped staging texture holds `height` rows of RowPitch
        // bytes and stays mapped until Unmap below.
        let data = unsafe { std::slice::from_raw_parts(mapped.pData as *const u8, len) };
        self.dispatcher.deliver(&FrameData {
            data,
            width,
            height,
            stride,
            timestamp_ms: timestamp_ms(),
        });

        unsafe { self.context.Unmap(&staging, 0) };
        Ok(())
    }

    /// CPU-readable BGRA8 texture, reused while the size is unchanged.
    fn staging_texture(&mut self, width: u32, height: u32) -> windows::core::Result<ID3D11Texture2D> {
        if let Some((tex, w, h)) = &self.staging {
            if *w == width && *h == height {
                return Ok(tex.clone());
            }
        }
        let desc = D3D11_TEXTURE2D_DESC {
            Width:          width,
            Height:         height,
            MipLevels:      1,
            ArraySize:      1,
            Format:         DXGI_FORMAT_B8G8R8A8_UNORM,
            SampleDesc:     DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            Usage:          D3D11_USAGE_STAGING,
            BindFlags:      0,
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
            MiscFlags:      0,
        };
        let mut tex: Option<ID3D11Texture2D> = None;
        unsafe { self.device.CreateTexture2D(&desc, None, Some(&mut tex))? };
        let tex = tex.ok_or_else(|| windows::core::Error::from(E_POINTER))?;
        debug!("Staging texture {width}x{height}");
        self.staging = Some((tex.clone(), width, height));
        Ok(tex)
    }
}

// ── Enumeration helpers ───────────────────────────────────────────────────────

/// Connected monitors, in the order Windows reports them.
fn enumerate_monitors() -> Vec<HMONITOR> {
    let mut list: Vec<HMONITOR> = Vec::new();

    unsafe extern "system" fn cb(hmon: HMONITOR, _: HDC, _: *mut RECT, data: LPARAM) -> BOOL {
        let list = data.0 as *mut Vec<HMONITOR>;
        unsafe { (*list).push(hmon) };
        BOOL(1)
    }

    unsafe {
        let _ = EnumDisplayMonitors(
            HDC::default(),
            None,
            Some(cb),
            LPARAM(&mut list as *mut _ as isize),
        );
    }
    list
}

fn monitor_info(hmon: HMONITOR) -> Option<Monitor> {
    let mut info = MONITORINFOEXW::default();
    info.monitorInfo.cbSize = std::mem::size_of::<MONITORINFOEXW>() as u32;
    let ok = unsafe { GetMonitorInfoW(hmon, &mut info as *mut MONITORINFOEXW as *mut MONITORINFO) };
    if !ok.as_bool() {
        return None;
    }

    let (mut dpi_x, mut dpi_y) = (96u32, 96u32);
    let dpi_scale = match unsafe { GetDpiForMonitor(hmon, MDT_EFFECTIVE_DPI, &mut dpi_x, &mut dpi_y) } {
        Ok(()) => dpi_x as f32 / 96.0,
        Err(_) => 1.0,
    };

    let rect = info.monitorInfo.rcMonitor;
    Some(Monitor {
        id: SourceId::new((hmon.0 as usize).to_string()),
        name: wide_to_string(&info.szDevice),
        x: rect.left,
        y: rect.top,
        width: rect_width(&rect),
        height: rect_height(&rect),
        is_primary: info.monitorInfo.dwFlags & MONITORINFOF_PRIMARY != 0,
        dpi_scale,
    })
}

fn enumerate_windows() -> Result<Vec<HWND>, CaptureError> {
    let mut list: Vec<HWND> = Vec::new();

    unsafe extern "system" fn cb(hwnd: HWND, data: LPARAM) -> BOOL {
        let list = data.0 as *mut Vec<HWND>;
        unsafe { (*list).push(hwnd) };
        BOOL(1)
    }

    unsafe { EnumWindows(Some(cb), LPARAM(&mut list as *mut _ as isize)) }
        .map_err(|e| CaptureError::backend("EnumWindows", e))?;
    Ok(list)
}

/// Visible, titled top-level windows only.
fn window_info(hwnd: HWND) -> Option<WindowInfo> {
    if !unsafe { IsWindowVisible(hwnd) }.as_bool() {
        return None;
    }
    let mut title = [0u16; 512];
    let len = unsafe { GetWindowTextW(hwnd, &mut title) };
    if len <= 0 {
        return None;
    }
    let rect = window_rect(hwnd)?;

    let mut pid = 0u32;
    unsafe { GetWindowThreadProcessId(hwnd, Some(&mut pid)) };

    Some(WindowInfo {
        id: SourceId::new((hwnd.0 as usize).to_string()),
        title: String::from_utf16_lossy(&title[..len as usize]),
        process_name: process_name(pid),
        process_id: pid,
        x: rect.left,
        y: rect.top,
        width: rect_width(&rect),
        height: rect_height(&rect),
        is_visible: true,
        is_minimized: unsafe { IsIconic(hwnd) }.as_bool(),
    })
}

fn window_rect(hwnd: HWND) -> Option<RECT> {
    let mut rect = RECT::default();
    unsafe { GetWindowRect(hwnd, &mut rect) }.ok()?;
    Some(rect)
}

/// Executable file name of `pid`, empty when the process cannot be opened.
fn process_name(pid: u32) -> String {
    let Ok(handle) = (unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) }) else {
        return String::new();
    };
    let mut buf = [0u16; 260];
    let mut len = buf.len() as u32;
    let queried = unsafe {
        QueryFullProcessImageNameW(handle, PROCESS_NAME_WIN32, PWSTR(buf.as_mut_ptr()), &mut len)
    };
    unsafe {
        let _ = CloseHandle(handle);
    }
    if queried.is_err() {
        return String::new();
    }
    let path = String::from_utf16_lossy(&buf[..len as usize]);
    path.rsplit('\\').next().unwrap_or_default().to_string()
}

fn wide_to_string(wide: &[u16]) -> String {
    let end = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..end])
}

fn cursor_showing(flags: CURSORINFO_FLAGS) -> bool {
    flags.0 & CURSOR_SHOWING.0 != 0
}

fn rect_width(rect: &RECT) -> u32 {
    (rect.right - rect.left).max(0) as u32
}

fn rect_height(rect: &RECT) -> u32 {
    (rect.bottom - rect.top).max(0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use windows::Win32::UI::WindowsAndMessaging::CURSOR_SUPPRESSED;

    #[test]
    fn cursor_flags_decide_visibility() {
        assert!(cursor_showing(CURSOR_SHOWING));
        assert!(!cursor_showing(CURSORINFO_FLAGS(0)));
        assert!(!cursor_showing(CURSOR_SUPPRESSED));
    }

    #[test]
    fn rect_size_clamps_inverted_rects() {
        let rect = RECT { left: 10, top: 20, right: 5, bottom: 60 };
        assert_eq!((rect_width(&rect), rect_height(&rect)), (0, 40));
    }
}
