mod route_status_updater;

pub use route_status_updater::RouteStatusUpdater;
