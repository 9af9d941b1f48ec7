use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    Device,
    NotActiveBluetooth,
    BluetoothScan,
    Timer,
    Details,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            Route::Home => "Home",
            Route::Device => "Device",
            Route::NotActiveBluetooth => "Bluetooth not connected",
            Route::BluetoothScan => "Find your lamp",
            Route::Timer => "Timer",
            Route::Details => "Details",
        };

        write!(f, "{}", result)
    }
}

/// The screens the user navigated through; the last one is shown.
#[derive(Debug, Clone)]
pub struct RouteStack {
    routes: Vec<Route>,
}

impl RouteStack {
    pub fn new() -> Self {
        RouteStack { routes: vec![Route::Home] }
    }

    pub fn current(&self) -> Route {
        *self.routes.last().unwrap_or(&Route::Home)
    }

    pub fn can_go_back(&self) -> bool {
        self.routes.len() > 1
    }

    /// Show `route`. Navigating to a route that is already on the stack goes back to it instead
    /// of stacking a second copy. Returns the route that was shown before.
    pub fn navigate(&mut self, route: Route) -> Route {
        let previous = self.current();

        if let Some(position) = self.routes.iter().position(|r| *r == route) {
            self.routes.truncate(position + 1);
        } else {
            self.routes.push(route);
        }

        previous
    }

    /// Replace the current route, for redirects that should not be reachable with back.
    pub fn replace(&mut self, route: Route) -> Route {
        let previous = self.current();
        if self.routes.len() > 1 {
            self.routes.pop();
        }
        if self.current() != route {
            self.routes.push(route);
        }
        previous
    }

    /// Go to the previous route; a no-op on the home screen. Returns the route that was shown
    /// before.
    pub fn back(&mut self) -> Route {
        let previous = self.current();
        if self.can_go_back() {
            self.routes.pop();
        }
        previous
    }
}

impl Default for RouteStack {
    fn default() -> Self {
        RouteStack::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_home_and_back_is_noop() {
        let mut stack = RouteStack::new();
        assert_eq!(stack.current(), Route::Home);
        assert!(!stack.can_go_back());

        assert_eq!(stack.back(), Route::Home);
        assert_eq!(stack.current(), Route::Home);
    }

    #[test]
    fn navigate_and_back() {
        let mut stack = RouteStack::new();
        assert_eq!(stack.navigate(Route::BluetoothScan), Route::Home);
        assert_eq!(stack.navigate(Route::Device), Route::BluetoothScan);
        assert_eq!(stack.navigate(Route::Timer), Route::Device);

        assert_eq!(stack.back(), Route::Timer);
        assert_eq!(stack.current(), Route::Device);
        stack.back();
        assert_eq!(stack.current(), Route::BluetoothScan);
    }

    #[test]
    fn navigate_to_known_route_unwinds() {
        let mut stack = RouteStack::new();
        stack.navigate(Route::Device);
        stack.navigate(Route::Timer);
        stack.navigate(Route::Home);

        assert_eq!(stack.current(), Route::Home);
        assert!(!stack.can_go_back());
    }

    #[test]
    fn replace_redirects() {
        let mut stack = RouteStack::new();
        stack.navigate(Route::Device);
        assert_eq!(stack.replace(Route::NotActiveBluetooth), Route::Device);

        assert_eq!(stack.current(), Route::NotActiveBluetooth);
        stack.back();
        assert_eq!(stack.current(), Route::Home);

        // replacing home keeps home underneath
        let mut stack = RouteStack::new();
        stack.replace(Route::Device);
        assert_eq!(stack.current(), Route::Device);
        stack.back();
        assert_eq!(stack.current(), Route::Home);
    }
}
