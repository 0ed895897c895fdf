pub mod prices;
pub mod series;
pub mod window;

pub use prices::{PriceRow, PriceTable};
pub use series::{IngestedReturns, MissingDataPolicy, ReturnRow, ReturnSeries, ReturnTable};
pub use window::{EstimationWindow, WindowEstimate};
