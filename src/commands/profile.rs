use std::task::{Context, Poll};

use tower::Service;
use uuid::Uuid;

use crate::{
    domain::{Profile, ProfileUpdate, Session},
    ports::{
        cache::{CachePort, KeyPattern, QueryKey, ReadModel},
        database::{self, DatabasePort},
    },
};

use super::{DomainLogic, Error, ServiceFuture};

pub struct GetProfileRequest {
    pub profile_id: Uuid,
}

/// Edit the profile of the signed-in user
///
/// There is no way to address another profile: the id always comes from the session.
pub struct UpdateProfileRequest {
    pub session: Session,
    pub update: ProfileUpdate,
}

fn profile_not_found(profile_id: Uuid) -> impl FnOnce(database::Error) -> Error {
    move |err| match err {
        database::Error::NotFound => Error::ProfileNotFound(profile_id),
        err => err.into(),
    }
}

impl<D, C> Service<GetProfileRequest> for DomainLogic<D, C>
where
    D: DatabasePort + 'static,
    C: CachePort + 'static,
{
    type Response = Profile;
    type Error = Error;
    type Future = ServiceFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: GetProfileRequest) -> Self::Future {
        let database = self.database.clone();
        let cache = self.cache.clone();
        Box::pin(async move {
            let key = QueryKey::Profile(req.profile_id);
            if let Some(ReadModel::Profile(profile)) = cache.get(&key) {
                return Ok(profile);
            }

            let generation = cache.generation();
            let profile = database
                .get_profile(req.profile_id)
                .await
                .map_err(profile_not_found(req.profile_id))?;
            cache.insert(key, ReadModel::Profile(profile.clone()), generation);

            Ok(profile)
        })
    }
}

impl<D, C> Service<UpdateProfileRequest> for DomainLogic<D, C>
where
    D: DatabasePort + 'static,
    C: CachePort + 'static,
{
    type Response = Profile;
    type Error = Error;
    type Future = ServiceFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: UpdateProfileRequest) -> Self::Future {
        let database = self.database.clone();
        let cache = self.cache.clone();
        Box::pin(async move {
            let user_id = req.session.user_id()?;

            let profile = database
                .update_profile(user_id, req.update)
                .await
                .map_err(profile_not_found(user_id))?;

            tracing::info!(profile_id = %user_id, rating = ?profile.rating, "updated profile");
            cache.invalidate(QueryKey::Profile(user_id).into());
            // Member lists and event details embed profile summaries
            cache.invalidate(KeyPattern::AllMembers);
            cache.invalidate(KeyPattern::AllEventDetails);

            Ok(profile)
        })
    }
}
