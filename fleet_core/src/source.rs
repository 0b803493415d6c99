//! Data source interface consumed by the controllers.

use crate::error::SourceError;
use crate::types::{ChannelId, HistoryRequest, HistoryResponse, PushBatch, VehicleId, VehicleSnapshot};

/// Where snapshots, push bursts and history come from.
///
/// Push delivery is pull-based: the dashboard drains pending batches for the
/// open channel on every [`advance`](crate::dashboard::Dashboard::advance).
pub trait FleetDataSource {
    /// Latest snapshot of every vehicle.
    fn fetch_snapshots(&mut self) -> Result<Vec<VehicleSnapshot>, SourceError>;

    /// Subscribe to one vehicle's push stream.
    fn open_channel(&mut self, vehicle: &VehicleId, snap_to_road: bool) -> Result<ChannelId, SourceError>;

    /// Unsubscribe. Closing an unknown or closed channel is a no-op.
    fn close_channel(&mut self, channel: ChannelId);

    /// Batches delivered on `channel` since the last call, oldest first.
    fn take_pushed(&mut self, channel: ChannelId) -> Vec<PushBatch>;

    fn fetch_history(&mut self, request: &HistoryRequest) -> Result<HistoryResponse, SourceError>;
}

/// Scripted in-memory source for controller tests.
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use crate::types::ReplayPoint;

    #[derive(Debug, Default)]
    pub struct FakeSource {
        pub snapshots: Vec<VehicleSnapshot>,
        pub history: Vec<ReplayPoint>,
        /// Returned by the next fallible call instead of data
        pub fail_next: Option<SourceError>,
        pub opened: Vec<(VehicleId, ChannelId, bool)>,
        pub closed: Vec<ChannelId>,
        pub pending: Vec<(ChannelId, PushBatch)>,
        pub next_channel: u64,
    }

    impl FakeSource {
        pub fn push(&mut self, channel: ChannelId, batch: PushBatch) {
            self.pending.push((channel, batch));
        }
    }

    impl FleetDataSource for FakeSource {
        fn fetch_snapshots(&mut self) -> Result<Vec<VehicleSnapshot>, SourceError> {
            match self.fail_next.take() {
                Some(e) => Err(e),
                None => Ok(self.snapshots.clone()),
            }
        }

        fn open_channel(&mut self, vehicle: &VehicleId, snap_to_road: bool) -> Result<ChannelId, SourceError> {
            if let Some(e) = self.fail_next.take() {
                return Err(e);
            }
            self.next_channel += 1;
            let channel = ChannelId(self.next_channel);
            self.opened.push((vehicle.clone(), channel, snap_to_road));
            Ok(channel)
        }

        fn close_channel(&mut self, channel: ChannelId) {
            self.closed.push(channel);
        }

        fn take_pushed(&mut self, channel: ChannelId) -> Vec<PushBatch> {
            let (mine, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
                .into_iter()
                .partition(|(c, _)| *c == channel);
            self.pending = rest;
            mine.into_iter().map(|(_, b)| b).collect()
        }

        fn fetch_history(&mut self, _request: &HistoryRequest) -> Result<HistoryResponse, SourceError> {
            match self.fail_next.take() {
                Some(e) => Err(e),
                None => Ok(HistoryResponse {
                    points: self.history.clone(),
                    distance_travelled_km: 1.5,
                }),
            }
        }
    }
}
