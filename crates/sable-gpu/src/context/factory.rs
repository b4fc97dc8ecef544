use anyhow::Result;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::device::{GpuFunctions, HeadlessFunctions, WgpuFunctions, WgpuInit};

use super::Context;

/// One tagged context-creation parameter.
#[derive(Debug, Copy, Clone)]
pub enum ContextParam {
    Display(RawDisplayHandle),
    Screen(i32),
    Window(RawWindowHandle),
}

/// Context-creation parameters after folding a parameter list.
#[derive(Debug, Default, Copy, Clone)]
pub struct ContextParams {
    pub display: Option<RawDisplayHandle>,
    pub screen: Option<i32>,
    pub window: Option<RawWindowHandle>,
}

impl ContextParams {
    /// Folds `params` in order; a later tag overrides an earlier one.
    pub fn from_list(params: &[ContextParam]) -> Self {
        params.iter().fold(Self::default(), |mut acc, param| {
            match *param {
                ContextParam::Display(display) => acc.display = Some(display),
                ContextParam::Screen(screen) => acc.screen = Some(screen),
                ContextParam::Window(window) => acc.window = Some(window),
            }
            acc
        })
    }

    /// True when the request targets a window rather than offscreen storage.
    pub fn is_onscreen(&self) -> bool {
        self.window.is_some()
    }
}

/// A platform backend able to resolve a function table.
pub trait Backend {
    fn name(&self) -> &'static str;

    /// Whether this backend can serve `params` at all.
    fn supports(&self, params: &ContextParams) -> bool;

    fn create(&self, params: &ContextParams) -> Result<Box<dyn GpuFunctions>>;
}

/// Offscreen contexts on a wgpu device.
#[derive(Debug, Default, Clone)]
pub struct WgpuBackend {
    pub init: WgpuInit,
}

impl Backend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn supports(&self, params: &ContextParams) -> bool {
        !params.is_onscreen()
    }

    fn create(&self, _params: &ContextParams) -> Result<Box<dyn GpuFunctions>> {
        Ok(Box::new(WgpuFunctions::new_headless(self.init.clone())?))
    }
}

/// CPU-only contexts; never fails.
#[derive(Debug, Default, Copy, Clone)]
pub struct HeadlessBackend;

impl Backend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn supports(&self, params: &ContextParams) -> bool {
        !params.is_onscreen()
    }

    fn create(&self, _params: &ContextParams) -> Result<Box<dyn GpuFunctions>> {
        let (functions, _probe) = HeadlessFunctions::new();
        Ok(Box::new(functions))
    }
}

/// Creates contexts from the first registered backend that accepts the
/// parameters and succeeds.
#[derive(Default)]
pub struct ContextFactory {
    backends: Vec<Box<dyn Backend>>,
}

impl ContextFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// wgpu first, headless as the fallback.
    pub fn with_default_backends() -> Self {
        let mut factory = Self::new();
        factory.register(WgpuBackend::default());
        factory.register(HeadlessBackend);
        factory
    }

    /// Appends a backend; earlier registrations win.
    pub fn register(&mut self, backend: impl Backend + 'static) {
        self.backends.push(Box::new(backend));
    }

    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Returns `None` when no backend matches `params` or all matching ones fail.
    pub fn create(&self, params: &[ContextParam]) -> Option<Context> {
        let params = ContextParams::from_list(params);

        for backend in self.backends.iter().filter(|b| b.supports(&params)) {
            match backend.create(&params) {
                Ok(functions) => {
                    log::debug!("context created by the {} backend", backend.name());
                    return Some(Context::new(functions));
                }
                Err(err) => log::warn!("{} backend failed: {err:#}", backend.name()),
            }
        }

        log::debug!("no backend accepted {params:?}");
        None
    }
}

#[cfg(test)]
mod tests {
    use raw_window_handle::{XlibDisplayHandle, XlibWindowHandle};

    use super::*;

    struct Failing;

    impl Backend for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn supports(&self, _params: &ContextParams) -> bool {
            true
        }

        fn create(&self, _params: &ContextParams) -> Result<Box<dyn GpuFunctions>> {
            anyhow::bail!("no driver")
        }
    }

    #[test]
    fn later_params_override_earlier_ones() {
        let params = ContextParams::from_list(&[
            ContextParam::Screen(0),
            ContextParam::Display(RawDisplayHandle::Xlib(XlibDisplayHandle::new(None, 0))),
            ContextParam::Screen(2),
        ]);
        assert_eq!(params.screen, Some(2));
        assert!(matches!(params.display, Some(RawDisplayHandle::Xlib(_))));
        assert!(!params.is_onscreen());
    }

    #[test]
    fn headless_backend_serves_offscreen_requests() {
        let mut factory = ContextFactory::new();
        factory.register(HeadlessBackend);

        let ctx = factory.create(&[ContextParam::Screen(0)]).unwrap();
        assert!(ctx.is_valid());
        assert!(ctx.alloc_texture().is_ok());
    }

    #[test]
    fn window_request_without_platform_backend_yields_none() {
        let factory = ContextFactory::with_default_backends();
        assert_eq!(factory.backend_names(), vec!["wgpu", "headless"]);

        let window = XlibWindowHandle::new(7);
        let params = [
            ContextParam::Display(RawDisplayHandle::Xlib(XlibDisplayHandle::new(None, 0))),
            ContextParam::Window(RawWindowHandle::Xlib(window)),
        ];
        assert!(factory.create(&params).is_none());
    }

    #[test]
    fn failing_backend_falls_through() {
        let mut factory = ContextFactory::new();
        factory.register(Failing);
        factory.register(HeadlessBackend);
        assert!(factory.create(&[]).is_some());

        let mut only_failing = ContextFactory::new();
        only_failing.register(Failing);
        assert!(only_failing.create(&[]).is_none());
    }
}
