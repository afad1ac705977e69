//! Anti-automation fingerprinting for browser sessions
//!
//! A session picks one randomized fingerprint (user agent, viewport, locale,
//! timezone, geolocation) at launch and keeps it for its whole lifetime; the
//! stealth script masks the usual automation markers and is registered once
//! per browser context, before any page load.

use once_cell::sync::Lazy;

/// Real browser signatures to rotate through.
static USER_AGENTS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        // Windows Chrome
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
        // Mac Safari / Chrome
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        // Firefox
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
        // Linux Chrome
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    ]
});

/// Common desktop viewport sizes.
static VIEWPORTS: Lazy<Vec<(u32, u32)>> = Lazy::new(|| {
    vec![(1920, 1080), (1366, 768), (1440, 900), (1536, 864)]
});

/// UK geolocations paired with the matching timezone.
static GEOLOCATIONS: Lazy<Vec<(&'static str, f64, f64)>> = Lazy::new(|| {
    vec![
        // city label kept for log readability only
        ("London", 51.5074, -0.1278),
        ("Manchester", 53.4808, -2.2426),
        ("Leeds", 53.8008, -1.5491),
        ("Edinburgh", 55.9533, -3.1883),
    ]
});

/// Injected before any page script runs. Masks the webdriver flag, fabricates
/// plugin and language lists, and fills in the APIs headless Chrome leaves
/// bare.
pub const STEALTH_SCRIPT: &str = r#"
// Hide webdriver property
Object.defineProperty(navigator, 'webdriver', {
    get: () => undefined
});

// Mock plugins
Object.defineProperty(navigator, 'plugins', {
    get: () => [
        { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer' },
        { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai' },
        { name: 'Native Client', filename: 'internal-nacl-plugin' }
    ]
});

// Mock languages
Object.defineProperty(navigator, 'languages', {
    get: () => ['en-GB', 'en', 'en-US']
});

// Override permissions API
const originalQuery = window.navigator.permissions.query;
window.navigator.permissions.query = (parameters) => (
    parameters.name === 'notifications' ?
        Promise.resolve({ state: Notification.permission }) :
        originalQuery(parameters)
);

// Mock chrome object
if (!window.chrome) {
    window.chrome = {};
}
window.chrome.runtime = {};

// Mock navigator.connection
navigator.connection = {
    effectiveType: '4g',
    rtt: 50,
    downlink: 10,
    saveData: false
};

// Hide automation indicators
delete navigator.__proto__.webdriver;

// Mock performance.memory
Object.defineProperty(window.performance, 'memory', {
    value: {
        totalJSHeapSize: 50000000,
        usedJSHeapSize: 40000000,
        jsHeapSizeLimit: 2000000000
    }
});
"#;

/// One browser session's identity. Chosen once at launch, never rotated
/// mid-session.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub locale: String,
    pub timezone: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accept_language: String,
}

impl Fingerprint {
    pub fn random() -> Self {
        let user_agent = USER_AGENTS[fastrand::usize(..USER_AGENTS.len())].to_string();
        let viewport = VIEWPORTS[fastrand::usize(..VIEWPORTS.len())];
        let (city, latitude, longitude) = GEOLOCATIONS[fastrand::usize(..GEOLOCATIONS.len())];

        Self {
            user_agent,
            viewport,
            locale: "en-GB".to_string(),
            timezone: "Europe/London".to_string(),
            city: city.to_string(),
            latitude,
            longitude,
            accept_language: "en-GB,en;q=0.9,en-US;q=0.8".to_string(),
        }
    }
}
