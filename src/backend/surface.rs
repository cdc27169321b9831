// Surface - platform window connection
//
// winit hands us raw-window-handle 0.6 handles; we turn them into the
// matching VK_KHR_*_surface extension and a vk::SurfaceKHR.

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::{vk, Entry, Instance};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::CStr;

/// Instance extensions needed to present to windows on this display.
pub fn required_extensions(display: RawDisplayHandle) -> Result<Vec<&'static CStr>> {
    let platform = match display {
        RawDisplayHandle::Windows(_) => khr::Win32Surface::name(),
        RawDisplayHandle::Xlib(_) => khr::XlibSurface::name(),
        RawDisplayHandle::Xcb(_) => khr::XcbSurface::name(),
        RawDisplayHandle::Wayland(_) => khr::WaylandSurface::name(),
        other => anyhow::bail!("Unsupported display handle: {:?}", other),
    };
    Ok(vec![khr::Surface::name(), platform])
}

/// Create a surface for the window.
///
/// # Safety
/// The handles must stay valid for the lifetime of the returned surface, and
/// `instance` must have been created with `required_extensions(display)`.
pub unsafe fn create_surface(
    entry: &Entry,
    instance: &Instance,
    display: RawDisplayHandle,
    window: RawWindowHandle,
) -> Result<vk::SurfaceKHR> {
    let surface = match (display, window) {
        (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(handle)) => {
            let hinstance = handle.hinstance.map(|h| h.get()).unwrap_or(0) as *const std::ffi::c_void;
            let hwnd = handle.hwnd.get() as *const std::ffi::c_void;
            let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                .hinstance(hinstance)
                .hwnd(hwnd);
            khr::Win32Surface::new(entry, instance).create_win32_surface(&create_info, None)
        }

        (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(handle)) => {
            let dpy = display.display.context("Xlib display handle is null")?;
            let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                .dpy(dpy.as_ptr() as *mut _)
                .window(handle.window);
            khr::XlibSurface::new(entry, instance).create_xlib_surface(&create_info, None)
        }

        (RawDisplayHandle::Xcb(display), RawWindowHandle::Xcb(handle)) => {
            let connection = display.connection.context("XCB connection handle is null")?;
            let create_info = vk::XcbSurfaceCreateInfoKHR::builder()
                .connection(connection.as_ptr() as *mut _)
                .window(handle.window.get());
            khr::XcbSurface::new(entry, instance).create_xcb_surface(&create_info, None)
        }

        (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(handle)) => {
            let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                .display(display.display.as_ptr() as *mut _)
                .surface(handle.surface.as_ptr() as *mut _);
            khr::WaylandSurface::new(entry, instance).create_wayland_surface(&create_info, None)
        }

        (display, window) => {
            anyhow::bail!("Unsupported window handle pair: {:?} / {:?}", display, window)
        }
    };

    surface.context("Failed to create window surface")
}

#[cfg(test)]
mod tests {
    use super::*;
    use raw_window_handle::{
        AppKitDisplayHandle, WaylandDisplayHandle, WindowsDisplayHandle, XcbDisplayHandle,
        XlibDisplayHandle,
    };
    use std::ptr::NonNull;

    fn names(display: RawDisplayHandle) -> Vec<String> {
        required_extensions(display)
            .unwrap()
            .iter()
            .map(|n| n.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn x11_and_wayland_need_their_own_surface_extension() {
        assert_eq!(
            names(RawDisplayHandle::Xlib(XlibDisplayHandle::new(None, 0))),
            ["VK_KHR_surface", "VK_KHR_xlib_surface"]
        );
        assert_eq!(
            names(RawDisplayHandle::Xcb(XcbDisplayHandle::new(None, 0))),
            ["VK_KHR_surface", "VK_KHR_xcb_surface"]
        );
        assert_eq!(
            names(RawDisplayHandle::Wayland(WaylandDisplayHandle::new(NonNull::dangling()))),
            ["VK_KHR_surface", "VK_KHR_wayland_surface"]
        );
    }

    #[test]
    fn windows_needs_win32_surface() {
        assert_eq!(
            names(RawDisplayHandle::Windows(WindowsDisplayHandle::new())),
            ["VK_KHR_surface", "VK_KHR_win32_surface"]
        );
    }

    #[test]
    fn unsupported_platform_is_an_error() {
        assert!(required_extensions(RawDisplayHandle::AppKit(AppKitDisplayHandle::new())).is_err());
    }
}
